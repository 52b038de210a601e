//! Core types for the fitscore pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw samples, cleaned heart-rate samples, aligned minute rows and
//! per-day aggregates.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScoreError;

/// Export stream identifier, one per per-minute export file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    HeartRate,
    Steps,
    Mets,
    Sleep,
    Intensity,
    SleepStages,
}

impl StreamKind {
    pub const ALL: [StreamKind; 6] = [
        StreamKind::HeartRate,
        StreamKind::Steps,
        StreamKind::Mets,
        StreamKind::Sleep,
        StreamKind::Intensity,
        StreamKind::SleepStages,
    ];

    /// Name fragment identifying this stream's export file
    pub fn file_marker(&self) -> &'static str {
        match self {
            StreamKind::HeartRate => "heartrate_1min",
            StreamKind::Steps => "minuteStepsNarrow",
            StreamKind::Mets => "minuteMETsNarrow",
            StreamKind::Sleep => "minuteSleep",
            StreamKind::Intensity => "minuteIntensitiesNarrow",
            StreamKind::SleepStages => "30secondSleepStages",
        }
    }

    /// Classify an export file name by its marker
    pub fn from_file_name(name: &str) -> Option<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .find(|kind| name.contains(kind.file_marker()))
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_marker())
    }
}

/// One observation as read from an export file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample<T> {
    /// Local wall-clock time including seconds
    pub timestamp: NaiveDateTime,
    pub value: T,
}

impl<T> RawSample<T> {
    pub fn new(timestamp: NaiveDateTime, value: T) -> Self {
        Self { timestamp, value }
    }
}

/// Heart-rate sample that survived artifact removal, at minute resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateSample {
    pub minute: NaiveDateTime,
    pub bpm: f64,
}

/// Minute-level sleep state from the sleep export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepState {
    /// Vendor sleep state code (1 asleep, 2 restless, 3 awake)
    pub value: i64,
    pub log_id: Option<i64>,
}

/// Sleep stage classification from the 30-second export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Light,
    Deep,
    Rem,
    Wake,
}

impl FromStr for SleepStage {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(SleepStage::Light),
            "deep" => Ok(SleepStage::Deep),
            "rem" => Ok(SleepStage::Rem),
            "wake" => Ok(SleepStage::Wake),
            _ => Err(ScoreError::malformed("SleepStage", s)),
        }
    }
}

/// Activity intensity level (export codes 0-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityLevel {
    Sedentary,
    Light,
    Moderate,
    Vigorous,
}

impl IntensityLevel {
    pub const ALL: [IntensityLevel; 4] = [
        IntensityLevel::Sedentary,
        IntensityLevel::Light,
        IntensityLevel::Moderate,
        IntensityLevel::Vigorous,
    ];

    pub fn from_code(code: i64) -> Option<IntensityLevel> {
        match code {
            0 => Some(IntensityLevel::Sedentary),
            1 => Some(IntensityLevel::Light),
            2 => Some(IntensityLevel::Moderate),
            3 => Some(IntensityLevel::Vigorous),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntensityLevel::Sedentary => "sedentary",
            IntensityLevel::Light => "light",
            IntensityLevel::Moderate => "moderate",
            IntensityLevel::Vigorous => "vigorous",
        }
    }
}

/// All streams of one participant time range, as ingested
#[derive(Debug, Clone, Default)]
pub struct RawStreams {
    pub heart_rate: Vec<RawSample<f64>>,
    pub steps: Vec<RawSample<u32>>,
    /// METs at the export's x10 scale
    pub mets: Vec<RawSample<f64>>,
    pub sleep: Vec<RawSample<SleepState>>,
    pub intensity: Vec<RawSample<IntensityLevel>>,
    pub sleep_stages: Vec<RawSample<SleepStage>>,
}

/// One heart-rate-present minute with every other stream joined in.
///
/// Only the aligner constructs these, and only for minutes that carry a
/// cleaned heart-rate sample, so `hr_value` is never absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinuteRow {
    pub minute: NaiveDateTime,
    pub hr_value: f64,
    pub steps: Option<u32>,
    pub mets: Option<f64>,
    pub sleep_value: Option<i64>,
    pub sleep_log_id: Option<i64>,
    pub intensity: Option<IntensityLevel>,
    /// Sleep stage observed in the :00 half of the minute
    pub sleep_stage: Option<SleepStage>,
    /// Sleep stage observed in the :30 half of the minute
    pub sleep_stage_30: Option<SleepStage>,
}

impl MinuteRow {
    /// A minute with no sleep state is an awake minute
    pub fn is_asleep(&self) -> bool {
        self.sleep_value.is_some()
    }
}

/// Minute row tagged with its study day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedMinute {
    pub day: i64,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u8,
    pub row: MinuteRow,
}

/// Open interval of study days, `after < day < before`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub after: i64,
    pub before: i64,
}

impl DayWindow {
    pub const fn open(after: i64, before: i64) -> Self {
        Self { after, before }
    }

    pub fn contains(&self, day: i64) -> bool {
        day > self.after && day < self.before
    }
}

/// Sum and count of observations, for zero-safe means
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    pub sum: f64,
    pub n: u32,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.n += 1;
    }

    /// Mean with the divisor floored to 1, so an empty bucket yields 0
    pub fn mean(&self) -> f64 {
        self.sum / f64::from(self.n.max(1))
    }
}

/// Minutes per intensity level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntensityMinutes {
    pub sedentary: u32,
    pub light: u32,
    pub moderate: u32,
    pub vigorous: u32,
}

impl IntensityMinutes {
    pub fn get(&self, level: IntensityLevel) -> u32 {
        match level {
            IntensityLevel::Sedentary => self.sedentary,
            IntensityLevel::Light => self.light,
            IntensityLevel::Moderate => self.moderate,
            IntensityLevel::Vigorous => self.vigorous,
        }
    }

    pub fn add(&mut self, level: IntensityLevel, minutes: u32) {
        match level {
            IntensityLevel::Sedentary => self.sedentary += minutes,
            IntensityLevel::Light => self.light += minutes,
            IntensityLevel::Moderate => self.moderate += minutes,
            IntensityLevel::Vigorous => self.vigorous += minutes,
        }
    }

    pub fn merge(&mut self, other: &IntensityMinutes) {
        for level in IntensityLevel::ALL {
            self.add(level, other.get(level));
        }
    }
}

/// Minutes per sleep stage, in half-minute increments
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SleepStageMinutes {
    pub light: f64,
    pub deep: f64,
    pub rem: f64,
    pub wake: f64,
}

impl SleepStageMinutes {
    pub fn get(&self, stage: SleepStage) -> f64 {
        match stage {
            SleepStage::Light => self.light,
            SleepStage::Deep => self.deep,
            SleepStage::Rem => self.rem,
            SleepStage::Wake => self.wake,
        }
    }

    pub fn add(&mut self, stage: SleepStage, minutes: f64) {
        match stage {
            SleepStage::Light => self.light += minutes,
            SleepStage::Deep => self.deep += minutes,
            SleepStage::Rem => self.rem += minutes,
            SleepStage::Wake => self.wake += minutes,
        }
    }

    pub fn merge(&mut self, other: &SleepStageMinutes) {
        self.light += other.light;
        self.deep += other.deep;
        self.rem += other.rem;
        self.wake += other.wake;
    }

    pub fn total(&self) -> f64 {
        self.light + self.deep + self.rem + self.wake
    }
}

/// Awake-side totals of one study day
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AwakeSummary {
    pub steps: u64,
    pub hr: RunningMean,
    /// METs already divided back to their natural scale
    pub mets: RunningMean,
    pub intensity: IntensityMinutes,
    /// Minutes that carried an intensity observation
    pub intensity_n: u32,
}

impl AwakeSummary {
    /// Awake minutes with a heart-rate reading, the wear-time measure
    pub fn wear_minutes(&self) -> u32 {
        self.hr.n
    }
}

/// Asleep-side totals of one study day
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AsleepSummary {
    pub hr: RunningMean,
    pub stages: SleepStageMinutes,
}

/// Per-day aggregate for one participant and study day
#[derive(Debug, Clone, PartialEq)]
pub struct DayAggregate {
    pub day: i64,
    /// Weekday of the first minute observed for the day
    pub weekday: u8,
    /// Present only if the day had at least one awake minute
    pub awake: Option<AwakeSummary>,
    /// Present only if the day had at least one asleep minute
    pub asleep: Option<AsleepSummary>,
    pub hr_overall: RunningMean,
    /// Present only if the day had an asleep heart-rate minute inside the bedtime window
    pub bedtime: Option<Bedtime>,
}

impl DayAggregate {
    pub fn is_weekend(&self) -> bool {
        self.weekday >= 5
    }
}

/// Bedtime candidates and the resolved bedtime of one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bedtime {
    /// Earliest asleep minute after noon
    pub laydown: Option<chrono::NaiveTime>,
    /// Earliest asleep minute of the day
    pub earliest_sleep: chrono::NaiveTime,
    /// Laydown, or the following day's earliest sleep when there is none
    pub resolved: Option<chrono::NaiveTime>,
}

/// Drop the seconds of a timestamp
pub fn truncate_to_minute(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}
