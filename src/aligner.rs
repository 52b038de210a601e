//! Minute-level alignment of the export streams
//!
//! Heart rate is the anchor series: every other stream is left-joined onto
//! the cleaned heart-rate minutes, so a minute without heart rate never
//! produces a row no matter what the other streams hold.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDateTime, Timelike};

use crate::types::{
    truncate_to_minute, HeartRateSample, MinuteRow, RawSample, RawStreams, SleepStage,
};

/// The two half-minute sleep-stage observations of one minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfMinuteStages {
    /// Observation stamped at :00
    pub first: SleepStage,
    /// Observation stamped at :30, if any
    pub second: Option<SleepStage>,
}

/// Joins the export streams into minute rows
pub struct MinuteAligner;

impl MinuteAligner {
    /// Build one row per heart-rate minute, in time order.
    ///
    /// When several streams report the same minute more than once, the first
    /// observation wins.
    pub fn align(heart_rate: &[HeartRateSample], streams: &RawStreams) -> Vec<MinuteRow> {
        let steps = minute_index(&streams.steps);
        let mets = minute_index(&streams.mets);
        let sleep = minute_index(&streams.sleep);
        let intensity = minute_index(&streams.intensity);
        let stages = split_half_minutes(&streams.sleep_stages);

        let mut rows: Vec<MinuteRow> = Vec::with_capacity(heart_rate.len());
        let mut seen: HashSet<NaiveDateTime> = HashSet::with_capacity(heart_rate.len());

        for hr in heart_rate {
            if !seen.insert(hr.minute) {
                continue;
            }
            let sleep_state = sleep.get(&hr.minute);
            let stage_pair = stages.get(&hr.minute);
            rows.push(MinuteRow {
                minute: hr.minute,
                hr_value: hr.bpm,
                steps: steps.get(&hr.minute).copied(),
                mets: mets.get(&hr.minute).copied(),
                sleep_value: sleep_state.map(|s| s.value),
                sleep_log_id: sleep_state.and_then(|s| s.log_id),
                intensity: intensity.get(&hr.minute).copied(),
                sleep_stage: stage_pair.map(|p| p.first),
                sleep_stage_30: stage_pair.and_then(|p| p.second),
            });
        }

        rows.sort_by_key(|r| r.minute);
        rows
    }
}

/// Index a stream by minute, keeping the first observation of each minute
fn minute_index<T: Copy>(samples: &[RawSample<T>]) -> HashMap<NaiveDateTime, T> {
    let mut index = HashMap::with_capacity(samples.len());
    for sample in samples {
        index
            .entry(truncate_to_minute(sample.timestamp))
            .or_insert(sample.value);
    }
    index
}

/// Split the 30-second stage stream into its :00 and :30 slots and rejoin
/// them per minute.
///
/// The :00 series is the left side of the join, so a minute that only has a
/// :30 observation is dropped. Samples stamped at any other second are
/// ignored.
pub fn split_half_minutes(
    samples: &[RawSample<SleepStage>],
) -> HashMap<NaiveDateTime, HalfMinuteStages> {
    let mut first_half: Vec<(NaiveDateTime, SleepStage)> = Vec::new();
    let mut second_half: HashMap<NaiveDateTime, SleepStage> = HashMap::new();
    let mut off_slot = 0usize;

    for sample in samples {
        let minute = truncate_to_minute(sample.timestamp);
        match sample.timestamp.second() {
            0 => first_half.push((minute, sample.value)),
            30 => {
                second_half.entry(minute).or_insert(sample.value);
            }
            _ => off_slot += 1,
        }
    }

    if off_slot > 0 {
        tracing::debug!(off_slot, "ignored sleep-stage samples outside the :00/:30 slots");
    }

    let mut joined = HashMap::with_capacity(first_half.len());
    for (minute, stage) in first_half {
        joined.entry(minute).or_insert(HalfMinuteStages {
            first: stage,
            second: second_half.get(&minute).copied(),
        });
    }
    joined
}
