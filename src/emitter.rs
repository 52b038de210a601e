//! Score emission
//!
//! This module flattens day and week aggregates into named score fields,
//! keyed by participant and event, and merges the records produced by
//! several time-range runs.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::daily::DailyAggregates;
use crate::error::ScoreError;
use crate::types::{DayAggregate, DayWindow, IntensityLevel, SleepStageMinutes};
use crate::weekly::{WeekAggregate, WeeklySummary, WEEK_COUNT};

/// Days that get per-day fields
pub const DAILY_WINDOW: DayWindow = DayWindow::open(-1, 22);

/// Value of `import_error` when every required stream was read
pub const NO_ERROR: &str = "no error";

/// Sleep stage field fragments, in emission order
const STAGE_NAMES: [&str; 4] = ["light", "deep", "rem", "awake"];

/// A single score value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ScoreValue {
    /// Fixed two-decimal text, as the record system stores means
    pub fn fixed(value: f64) -> Self {
        if value.is_finite() {
            ScoreValue::Text(format!("{value:.2}"))
        } else {
            ScoreValue::empty()
        }
    }

    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            ScoreValue::Number(value)
        } else {
            ScoreValue::empty()
        }
    }

    pub fn empty() -> Self {
        ScoreValue::Text(String::new())
    }

    /// Rewrite null-like values to the empty string
    pub fn sanitized(self) -> Self {
        match self {
            ScoreValue::Number(v) if !v.is_finite() => ScoreValue::empty(),
            ScoreValue::Text(s) if s.eq_ignore_ascii_case("nan") => ScoreValue::empty(),
            other => other,
        }
    }
}

impl From<u32> for ScoreValue {
    fn from(value: u32) -> Self {
        ScoreValue::Integer(i64::from(value))
    }
}

impl From<u64> for ScoreValue {
    fn from(value: u64) -> Self {
        ScoreValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<String> for ScoreValue {
    fn from(value: String) -> Self {
        ScoreValue::Text(value)
    }
}

/// Named score fields for one participant and event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(rename = "id_redcap")]
    pub participant_id: String,
    #[serde(rename = "redcap_event_name")]
    pub event_name: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, ScoreValue>,
}

impl ScoreRecord {
    pub fn new(participant_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            event_name: event_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: String, value: impl Into<ScoreValue>) {
        self.fields.insert(name, value.into().sanitized());
    }

    pub fn get(&self, name: &str) -> Option<&ScoreValue> {
        self.fields.get(name)
    }
}

/// Merge records sharing a participant and event.
///
/// Fields are applied in input order, so a later record overwrites an
/// earlier one field by field and fields it lacks are kept. Output is
/// sorted by key.
pub fn merge_records(records: impl IntoIterator<Item = ScoreRecord>) -> Vec<ScoreRecord> {
    let mut merged: BTreeMap<(String, String), ScoreRecord> = BTreeMap::new();

    for record in records {
        let key = (record.participant_id.clone(), record.event_name.clone());
        match merged.get_mut(&key) {
            Some(existing) => existing.fields.extend(record.fields),
            None => {
                merged.insert(key, record);
            }
        }
    }

    merged.into_values().collect()
}

/// Builds score records with a configured field prefix
#[derive(Debug, Clone)]
pub struct ScoreEmitter {
    prefix: String,
}

impl Default for ScoreEmitter {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl ScoreEmitter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.field_prefix.clone())
    }

    /// Full field name for a metric
    pub fn field(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn import_error_field(&self) -> String {
        self.field("import_error")
    }

    /// Record for a successfully scored time range, with `import_error` set
    /// to [`NO_ERROR`]
    pub fn emit(
        &self,
        participant_id: &str,
        event_name: &str,
        daily: &DailyAggregates,
        weekly: &WeeklySummary,
    ) -> ScoreRecord {
        let mut record = ScoreRecord::new(participant_id, event_name);
        record.insert(self.import_error_field(), NO_ERROR.to_string());

        for day in daily.iter() {
            if day.day == 0 && day.awake.is_some() {
                record.insert(self.field("day_of_week_day00"), u32::from(day.weekday));
            }
            if DAILY_WINDOW.contains(day.day) {
                self.emit_day(&mut record, day);
            }
        }

        for week in &weekly.weeks {
            self.emit_week(&mut record, week);
        }
        self.emit_splits(&mut record, weekly);

        record
    }

    /// Record carrying only a failure description
    pub fn error_record(
        &self,
        participant_id: &str,
        event_name: &str,
        error: &ScoreError,
    ) -> ScoreRecord {
        let mut record = ScoreRecord::new(participant_id, event_name);
        record.insert(self.import_error_field(), error.to_string());
        record
    }

    /// Merge the records of every time range. Each input record already
    /// carries `import_error`, so the last range scored for a key decides it.
    pub fn finalize(&self, records: impl IntoIterator<Item = ScoreRecord>) -> Vec<ScoreRecord> {
        merge_records(records)
    }

    fn emit_day(&self, record: &mut ScoreRecord, day: &DayAggregate) {
        let suffix = format!("day{:02}", day.day);

        if let Some(bedtime) = day.bedtime {
            record.insert(
                self.field(&format!("bedtime_{suffix}")),
                ScoreValue::Text(format_bedtime(bedtime.resolved)),
            );
        }

        if let Some(awake) = day.awake {
            record.insert(self.field(&format!("steps_{suffix}")), awake.steps);
            record.insert(
                self.field(&format!("mets_{suffix}")),
                ScoreValue::fixed(awake.mets.mean()),
            );
            record.insert(
                self.field(&format!("metsminutes_{suffix}")),
                ScoreValue::fixed(awake.mets.sum),
            );
            record.insert(
                self.field(&format!("hr_awake_{suffix}")),
                ScoreValue::fixed(awake.hr.mean()),
            );
            record.insert(self.field(&format!("wearminutes_{suffix}")), awake.wear_minutes());
            for level in IntensityLevel::ALL {
                record.insert(
                    self.field(&format!("intensityminutes_{}_{suffix}", level.as_str())),
                    awake.intensity.get(level),
                );
            }
        }

        if let Some(asleep) = day.asleep {
            record.insert(
                self.field(&format!("hr_sleep_{suffix}")),
                ScoreValue::fixed(asleep.hr.mean()),
            );
            record.insert(
                self.field(&format!("sleepminutes_combined_{suffix}")),
                ScoreValue::number(asleep.stages.total()),
            );
            for (name, minutes) in STAGE_NAMES.iter().zip(stage_values(&asleep.stages)) {
                record.insert(
                    self.field(&format!("sleepminutes_{name}_{suffix}")),
                    ScoreValue::number(minutes),
                );
            }
        }

        record.insert(
            self.field(&format!("hr_overall_{suffix}")),
            ScoreValue::fixed(day.hr_overall.mean()),
        );
    }

    fn emit_week(&self, record: &mut ScoreRecord, week: &WeekAggregate) {
        let n = week.week + 1;

        if let Some(activity) = week.activity {
            record.insert(self.field(&format!("steps_week{n}")), activity.steps);
            record.insert(
                self.field(&format!("stepsavg_week{n}")),
                ScoreValue::fixed(activity.steps_average()),
            );
            if let Some(steps) = activity.steps_workday {
                record.insert(self.field(&format!("steps_workday_week{n}")), steps);
            }
            if let Some(steps) = activity.steps_weekend {
                record.insert(self.field(&format!("steps_weekend_week{n}")), steps);
            }
            record.insert(
                self.field(&format!("metsavg_week{n}")),
                ScoreValue::fixed(activity.mets.mean()),
            );
            for level in IntensityLevel::ALL {
                record.insert(
                    self.field(&format!("intensityminutes_{}_week{n}", level.as_str())),
                    activity.intensity.get(level),
                );
            }
        }

        // Wear fields are reported for every week, qualifying days or not
        record.insert(
            self.field(&format!("wearminutesavg_week{n}")),
            ScoreValue::fixed(week.wear.average()),
        );
        record.insert(self.field(&format!("weardays_awake_week{n}")), week.wear.days);
        record.insert(self.field(&format!("wearminutes_sum_week{n}")), week.wear.minutes);

        if let Some(sleep) = week.sleep {
            for (name, avg) in STAGE_NAMES.iter().zip(stage_values(&sleep.averages())) {
                record.insert(
                    self.field(&format!("sleep_{name}avg_week{n}")),
                    ScoreValue::fixed(avg),
                );
            }
            record.insert(
                self.field(&format!("sleep_combinedavg_week{n}")),
                ScoreValue::fixed(sleep.combined_average()),
            );
        }
    }

    fn emit_splits(&self, record: &mut ScoreRecord, weekly: &WeeklySummary) {
        record.insert(self.field("metsavg_workday"), ScoreValue::fixed(weekly.mets_workday.mean()));
        record.insert(self.field("metsavg_weekend"), ScoreValue::fixed(weekly.mets_weekend.mean()));

        record.insert(self.field("weardays_awake_workday"), weekly.wear_workday.days);
        record.insert(self.field("weardays_awake_weekend"), weekly.wear_weekend.days);
        record.insert(self.field("wearminutes_sum_workday"), weekly.wear_workday.minutes);
        record.insert(self.field("wearminutes_sum_weekend"), weekly.wear_weekend.minutes);

        let splits = [
            ("workday", &weekly.sleep_workday),
            ("weekend", &weekly.sleep_weekend),
        ];
        for (split, bucket) in splits {
            for (name, avg) in STAGE_NAMES.iter().zip(stage_values(&bucket.averages())) {
                record.insert(
                    self.field(&format!("sleep_{name}avg_{split}")),
                    ScoreValue::fixed(avg),
                );
            }
        }
    }
}

fn stage_values(stages: &SleepStageMinutes) -> [f64; 4] {
    [stages.light, stages.deep, stages.rem, stages.wake]
}

fn format_bedtime(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AsleepSummary, AwakeSummary, Bedtime, RunningMean};
    use crate::weekly::WeeklyRollup;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> ScoreValue {
        ScoreValue::Text(s.to_string())
    }

    fn record(fields: &[(&str, ScoreValue)]) -> ScoreRecord {
        let mut record = ScoreRecord::new("NDAR_INV0AU5R8NA", "baseline_year_1_arm_1");
        for (name, value) in fields {
            record.insert(name.to_string(), value.clone());
        }
        record
    }

    fn awake_day(day: i64, weekday: u8) -> DayAggregate {
        let mut awake = AwakeSummary {
            steps: 4200,
            ..Default::default()
        };
        awake.hr.push(70.0);
        awake.hr.push(80.0);
        awake.mets.push(1.2);
        awake.mets.push(1.0);
        awake.intensity.add(IntensityLevel::Moderate, 2);
        awake.intensity_n = 2;
        DayAggregate {
            day,
            weekday,
            awake: Some(awake),
            asleep: None,
            hr_overall: awake.hr,
            bedtime: None,
        }
    }

    #[test]
    fn test_merge_disjoint_fields_is_union() {
        let a = record(&[("fits_ss_steps_day01", ScoreValue::Integer(10))]);
        let b = record(&[("fits_ss_steps_day02", ScoreValue::Integer(20))]);

        let merged = merge_records(vec![a, b]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].fields.len(), 2);
        assert_eq!(merged[0].get("fits_ss_steps_day01"), Some(&ScoreValue::Integer(10)));
        assert_eq!(merged[0].get("fits_ss_steps_day02"), Some(&ScoreValue::Integer(20)));
    }

    #[test]
    fn test_merge_later_record_wins_on_overlap() {
        let a = record(&[
            ("fits_ss_steps_day01", ScoreValue::Integer(10)),
            ("fits_ss_import_error", text("missing minuteSleep export")),
        ]);
        let b = record(&[
            ("fits_ss_steps_day01", ScoreValue::Integer(99)),
            ("fits_ss_import_error", text(NO_ERROR)),
        ]);

        let merged = merge_records(vec![a, b]);

        assert_eq!(merged[0].get("fits_ss_steps_day01"), Some(&ScoreValue::Integer(99)));
        assert_eq!(merged[0].get("fits_ss_import_error"), Some(&text(NO_ERROR)));
    }

    #[test]
    fn test_later_error_overwrites_earlier_success() {
        let emitter = ScoreEmitter::default();
        let (daily, weekly) = (DailyAggregates::default(), WeeklySummary::default());
        let ok = emitter.emit("A", "baseline", &daily, &weekly);
        let err = ScoreError::MissingStream {
            stream: crate::types::StreamKind::Sleep,
            time_range: "20170601_20170701".to_string(),
        };
        let failed = emitter.error_record("A", "baseline", &err);

        let out = emitter.finalize(vec![ok, failed]);

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].get("fits_ss_import_error"),
            Some(&text("missing minuteSleep export for time range 20170601_20170701"))
        );
        assert_eq!(out[0].get("fits_ss_weardays_awake_week1"), Some(&ScoreValue::Integer(0)));
    }

    #[test]
    fn test_merge_keeps_keys_apart() {
        let a = ScoreRecord::new("A", "baseline");
        let b = ScoreRecord::new("A", "followup");
        let c = ScoreRecord::new("A", "baseline");
        assert_eq!(merge_records(vec![b, a, c]).len(), 2);
    }

    #[test]
    fn test_nan_becomes_empty_string() {
        let rec = record(&[
            ("fits_ss_a", ScoreValue::Number(f64::NAN)),
            ("fits_ss_b", text("nan")),
            ("fits_ss_c", ScoreValue::fixed(f64::INFINITY)),
        ]);
        for field in ["fits_ss_a", "fits_ss_b", "fits_ss_c"] {
            assert_eq!(rec.get(field), Some(&text("")));
        }
    }

    #[test]
    fn test_every_record_carries_import_error() {
        let emitter = ScoreEmitter::default();
        let err = ScoreError::Configuration("missing device issuance date".to_string());
        let (daily, weekly) = (DailyAggregates::default(), WeeklySummary::default());
        let records = vec![
            emitter.emit("A", "baseline", &daily, &weekly),
            emitter.error_record("B", "baseline", &err),
        ];

        let out = emitter.finalize(records);

        assert_eq!(out[0].get("fits_ss_import_error"), Some(&text(NO_ERROR)));
        assert_eq!(
            out[1].get("fits_ss_import_error"),
            Some(&text("configuration error: missing device issuance date"))
        );
    }

    #[test]
    fn test_day_fields() {
        let emitter = ScoreEmitter::default();
        let daily: DailyAggregates = [awake_day(0, 3), awake_day(5, 1)].into_iter().collect();

        let rec = emitter.emit("A", "baseline", &daily, &WeeklySummary::default());

        assert_eq!(rec.get("fits_ss_day_of_week_day00"), Some(&ScoreValue::Integer(3)));
        assert_eq!(rec.get("fits_ss_steps_day05"), Some(&ScoreValue::Integer(4200)));
        assert_eq!(rec.get("fits_ss_mets_day05"), Some(&text("1.10")));
        assert_eq!(rec.get("fits_ss_metsminutes_day05"), Some(&text("2.20")));
        assert_eq!(rec.get("fits_ss_hr_awake_day05"), Some(&text("75.00")));
        assert_eq!(rec.get("fits_ss_wearminutes_day05"), Some(&ScoreValue::Integer(2)));
        assert_eq!(
            rec.get("fits_ss_intensityminutes_moderate_day05"),
            Some(&ScoreValue::Integer(2))
        );
        assert_eq!(rec.get("fits_ss_hr_overall_day05"), Some(&text("75.00")));
        assert!(rec.get("fits_ss_hr_sleep_day05").is_none());
        assert!(rec.get("fits_ss_bedtime_day05").is_none());
    }

    #[test]
    fn test_days_outside_window_emit_nothing() {
        let emitter = ScoreEmitter::default();
        let daily: DailyAggregates = [awake_day(-1, 2), awake_day(22, 4)].into_iter().collect();

        let rec = emitter.emit("A", "baseline", &daily, &WeeklySummary::default());

        assert!(!rec.fields.keys().any(|k| k.ends_with("_day22") || k.contains("day-1")));
        assert!(rec.get("fits_ss_day_of_week_day00").is_none());
    }

    #[test]
    fn test_sleep_and_bedtime_fields() {
        let emitter = ScoreEmitter::default();
        let day = DayAggregate {
            day: 3,
            weekday: 0,
            awake: None,
            asleep: Some(AsleepSummary {
                hr: RunningMean { sum: 110.0, n: 2 },
                stages: SleepStageMinutes {
                    light: 0.5,
                    deep: 0.0,
                    rem: 0.5,
                    wake: 0.0,
                },
            }),
            hr_overall: RunningMean { sum: 110.0, n: 2 },
            bedtime: Some(Bedtime {
                laydown: None,
                earliest_sleep: NaiveTime::from_hms_opt(1, 5, 0).unwrap(),
                resolved: None,
            }),
        };
        let daily: DailyAggregates = [day].into_iter().collect();

        let rec = emitter.emit("A", "baseline", &daily, &WeeklySummary::default());

        assert_eq!(rec.get("fits_ss_bedtime_day03"), Some(&text("")));
        assert_eq!(rec.get("fits_ss_hr_sleep_day03"), Some(&text("55.00")));
        assert_eq!(rec.get("fits_ss_sleepminutes_combined_day03"), Some(&ScoreValue::Number(1.0)));
        assert_eq!(rec.get("fits_ss_sleepminutes_rem_day03"), Some(&ScoreValue::Number(0.5)));
        assert!(rec.get("fits_ss_steps_day03").is_none());
    }

    #[test]
    fn test_empty_rollup_reports_zero_wear() {
        let emitter = ScoreEmitter::default();
        let (daily, weekly) = (DailyAggregates::default(), WeeklySummary::default());
        let rec = emitter.emit("A", "baseline", &daily, &weekly);

        for n in 1..=WEEK_COUNT {
            assert_eq!(rec.get(&format!("fits_ss_wearminutesavg_week{n}")), Some(&text("0.00")));
            assert_eq!(
                rec.get(&format!("fits_ss_weardays_awake_week{n}")),
                Some(&ScoreValue::Integer(0))
            );
            assert!(rec.get(&format!("fits_ss_steps_week{n}")).is_none());
        }
        assert_eq!(rec.get("fits_ss_metsavg_workday"), Some(&text("0.00")));
        assert_eq!(rec.get("fits_ss_sleep_deepavg_weekend"), Some(&text("0.00")));
    }

    #[test]
    fn test_week_fields() {
        let emitter = ScoreEmitter::default();
        let daily: DailyAggregates = [awake_day(1, 0), awake_day(2, 5)].into_iter().collect();
        let weekly = WeeklyRollup::default().rollup(&daily);

        let rec = emitter.emit("A", "baseline", &daily, &weekly);

        assert_eq!(rec.get("fits_ss_steps_week1"), Some(&ScoreValue::Integer(8400)));
        assert_eq!(rec.get("fits_ss_stepsavg_week1"), Some(&text("4200.00")));
        assert_eq!(rec.get("fits_ss_steps_workday_week1"), Some(&ScoreValue::Integer(4200)));
        assert_eq!(rec.get("fits_ss_steps_weekend_week1"), Some(&ScoreValue::Integer(4200)));
        assert_eq!(rec.get("fits_ss_metsavg_week1"), Some(&text("1.10")));
        assert_eq!(
            rec.get("fits_ss_intensityminutes_moderate_week1"),
            Some(&ScoreValue::Integer(4))
        );
        assert!(rec.get("fits_ss_steps_week2").is_none());
    }

    #[test]
    fn test_record_serializes_flat() {
        let rec = record(&[("fits_ss_steps_day01", ScoreValue::Integer(10))]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["id_redcap"], "NDAR_INV0AU5R8NA");
        assert_eq!(json["redcap_event_name"], "baseline_year_1_arm_1");
        assert_eq!(json["fits_ss_steps_day01"], 10);
    }
}
