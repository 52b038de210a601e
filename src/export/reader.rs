use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::discovery::TimeRange;
use crate::error::ScoreError;
use crate::types::{IntensityLevel, RawSample, RawStreams, SleepStage, SleepState, StreamKind};

/// Timestamp layouts seen in exports, most common first
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Row counts per stream for one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows: BTreeMap<StreamKind, usize>,
    /// Rows dropped because a timestamp or value was malformed
    pub skipped: BTreeMap<StreamKind, usize>,
}

impl IngestStats {
    fn record_row(&mut self, kind: StreamKind) {
        *self.rows.entry(kind).or_default() += 1;
    }

    fn record_skip(&mut self, kind: StreamKind) {
        *self.skipped.entry(kind).or_default() += 1;
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

#[derive(Debug, Deserialize)]
struct HeartRateRecord {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepsRecord {
    #[serde(rename = "ActivityMinute")]
    minute: String,
    #[serde(rename = "Steps")]
    steps: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetsRecord {
    #[serde(rename = "ActivityMinute")]
    minute: String,
    #[serde(rename = "METs")]
    mets: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SleepRecord {
    date: String,
    value: Option<String>,
    #[serde(rename = "logId")]
    log_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntensityRecord {
    #[serde(rename = "ActivityMinute")]
    minute: String,
    #[serde(rename = "Intensity")]
    intensity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SleepStageRecord {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "SleepStage")]
    stage: Option<String>,
}

/// Reads export CSVs into typed raw samples
pub struct ExportReader;

impl ExportReader {
    /// Read every stream file of a time range.
    ///
    /// Fails with [`ScoreError::MissingStream`] when a required stream has no
    /// file; optional streams without a file come back empty.
    pub fn read_time_range(
        range: &TimeRange,
        required: &[StreamKind],
    ) -> Result<(RawStreams, IngestStats), ScoreError> {
        if let Some(stream) = range.missing_streams(required).into_iter().next() {
            return Err(ScoreError::MissingStream {
                stream,
                time_range: range.token.clone(),
            });
        }

        let mut stats = IngestStats::default();
        let mut streams = RawStreams::default();

        for kind in StreamKind::ALL {
            let Some(file) = range.file_for(kind) else {
                continue;
            };
            let reader = File::open(&file.path)?;
            match kind {
                StreamKind::HeartRate => {
                    streams.heart_rate = Self::read_heart_rate(reader, &mut stats)?
                }
                StreamKind::Steps => streams.steps = Self::read_steps(reader, &mut stats)?,
                StreamKind::Mets => streams.mets = Self::read_mets(reader, &mut stats)?,
                StreamKind::Sleep => streams.sleep = Self::read_sleep(reader, &mut stats)?,
                StreamKind::Intensity => {
                    streams.intensity = Self::read_intensity(reader, &mut stats)?
                }
                StreamKind::SleepStages => {
                    streams.sleep_stages = Self::read_sleep_stages(reader, &mut stats)?
                }
            }
        }

        Ok((streams, stats))
    }

    pub fn read_heart_rate<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<f64>>, ScoreError> {
        read_rows(reader, StreamKind::HeartRate, stats, |r: HeartRateRecord| {
            let value = parse_number("Value", required(r.value))?;
            Ok(RawSample::new(parse_export_timestamp(&r.time)?, value))
        })
    }

    pub fn read_steps<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<u32>>, ScoreError> {
        read_rows(reader, StreamKind::Steps, stats, |r: StepsRecord| {
            let raw = required(r.steps);
            let steps = parse_number("Steps", raw.clone())?;
            if steps < 0.0 || steps > f64::from(u32::MAX) {
                return Err(ScoreError::malformed("Steps", raw));
            }
            Ok(RawSample::new(
                parse_export_timestamp(&r.minute)?,
                steps.round() as u32,
            ))
        })
    }

    pub fn read_mets<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<f64>>, ScoreError> {
        read_rows(reader, StreamKind::Mets, stats, |r: MetsRecord| {
            let mets = parse_number("METs", required(r.mets))?;
            Ok(RawSample::new(parse_export_timestamp(&r.minute)?, mets))
        })
    }

    pub fn read_sleep<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<SleepState>>, ScoreError> {
        read_rows(reader, StreamKind::Sleep, stats, |r: SleepRecord| {
            let value = parse_code("value", required(r.value))?;
            // logId is informational only
            let log_id = r.log_id.and_then(|id| parse_code("logId", id).ok());
            Ok(RawSample::new(
                parse_export_timestamp(&r.date)?,
                SleepState { value, log_id },
            ))
        })
    }

    pub fn read_intensity<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<IntensityLevel>>, ScoreError> {
        read_rows(reader, StreamKind::Intensity, stats, |r: IntensityRecord| {
            let raw = required(r.intensity);
            let level = IntensityLevel::from_code(parse_code("Intensity", raw.clone())?)
                .ok_or_else(|| ScoreError::malformed("Intensity", raw))?;
            Ok(RawSample::new(parse_export_timestamp(&r.minute)?, level))
        })
    }

    pub fn read_sleep_stages<R: Read>(
        reader: R,
        stats: &mut IngestStats,
    ) -> Result<Vec<RawSample<SleepStage>>, ScoreError> {
        read_rows(reader, StreamKind::SleepStages, stats, |r: SleepStageRecord| {
            let stage: SleepStage = required(r.stage).parse()?;
            Ok(RawSample::new(parse_export_timestamp(&r.time)?, stage))
        })
    }
}

/// Deserialize every row, skipping rows that are ragged or whose conversion
/// fails. Only I/O errors end the read.
fn read_rows<R, Rec, T, F>(
    reader: R,
    kind: StreamKind,
    stats: &mut IngestStats,
    mut convert: F,
) -> Result<Vec<RawSample<T>>, ScoreError>
where
    R: Read,
    Rec: DeserializeOwned,
    F: FnMut(Rec) -> Result<RawSample<T>, ScoreError>,
{
    let mut csv_reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut samples = Vec::new();

    for (idx, record) in csv_reader.deserialize::<Rec>().enumerate() {
        stats.record_row(kind);
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                stats.record_skip(kind);
                tracing::debug!(
                    stream = %kind,
                    line = idx + 2,
                    error = %e,
                    "skipping unreadable row"
                );
                continue;
            }
        };
        match convert(record) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                stats.record_skip(kind);
                // header is line 1
                tracing::debug!(stream = %kind, line = idx + 2, error = %e, "skipping observation");
            }
        }
    }

    Ok(samples)
}

fn required(value: Option<String>) -> String {
    value.unwrap_or_default()
}

/// Parse an export timestamp such as `6/8/2017 2:43:30 PM`
pub fn parse_export_timestamp(raw: &str) -> Result<NaiveDateTime, ScoreError> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ScoreError::malformed("timestamp", raw))
}

fn parse_number(field: &'static str, raw: String) -> Result<f64, ScoreError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ScoreError::malformed(field, raw)),
    }
}

/// Integer code; `2.0` is accepted, `2.5` is not
fn parse_code(field: &'static str, raw: String) -> Result<i64, ScoreError> {
    let value = parse_number(field, raw.clone())?;
    if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(ScoreError::malformed(field, raw));
    }
    Ok(value as i64)
}
