//! Study-day indexing relative to the device-issuance anchor

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::config::DayBoundary;
use crate::error::ScoreError;
use crate::types::{IndexedMinute, MinuteRow};

const SECONDS_PER_DAY: i64 = 86_400;

/// Anchor layouts accepted from the roster, most specific first
const ANCHOR_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Maps timestamps to study-day offsets from the anchor. Day 0 is issuance day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayIndexer {
    anchor: NaiveDateTime,
    boundary: DayBoundary,
}

impl DayIndexer {
    pub fn new(anchor: NaiveDateTime, boundary: DayBoundary) -> Self {
        Self { anchor, boundary }
    }

    pub fn anchor(&self) -> NaiveDateTime {
        self.anchor
    }

    /// Study day of a timestamp; negative before the anchor
    pub fn day_of(&self, timestamp: NaiveDateTime) -> i64 {
        match self.boundary {
            DayBoundary::Calendar => (timestamp.date() - self.anchor.date()).num_days(),
            DayBoundary::Elapsed => (timestamp - self.anchor)
                .num_seconds()
                .div_euclid(SECONDS_PER_DAY),
        }
    }

    /// Tag every row with its study day and weekday (0 = Monday)
    pub fn index(&self, rows: &[MinuteRow]) -> Vec<IndexedMinute> {
        rows.iter()
            .map(|row| IndexedMinute {
                day: self.day_of(row.minute),
                weekday: weekday_of(row.minute),
                row: *row,
            })
            .collect()
    }
}

/// 0 = Monday .. 6 = Sunday
pub fn weekday_of(timestamp: NaiveDateTime) -> u8 {
    timestamp.weekday().num_days_from_monday() as u8
}

/// Parse a device-issuance date such as `2017-06-08 14:43`.
///
/// A bare date is taken as midnight. An empty value is a configuration
/// error: the participant cannot be scored without an anchor.
pub fn parse_anchor(raw: Option<&str>) -> Result<NaiveDateTime, ScoreError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ScoreError::Configuration(
            "missing device issuance date".to_string(),
        ));
    }

    ANCHOR_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            ScoreError::Configuration(format!("unparseable device issuance date {raw:?}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_calendar_days_ignore_anchor_time() {
        let indexer = DayIndexer::new(ts(8, 14, 43), DayBoundary::Calendar);
        assert_eq!(indexer.day_of(ts(8, 9, 0)), 0);
        assert_eq!(indexer.day_of(ts(8, 23, 59)), 0);
        assert_eq!(indexer.day_of(ts(9, 0, 1)), 1);
        assert_eq!(indexer.day_of(ts(7, 23, 0)), -1);
        assert_eq!(indexer.day_of(ts(30, 12, 0)), 22);
    }

    #[test]
    fn test_elapsed_days_floor_from_anchor_time() {
        let indexer = DayIndexer::new(ts(8, 14, 43), DayBoundary::Elapsed);
        assert_eq!(indexer.day_of(ts(9, 8, 0)), 0);
        assert_eq!(indexer.day_of(ts(9, 14, 43)), 1);
        // one minute before the anchor floors to -1, not 0
        assert_eq!(indexer.day_of(ts(8, 14, 42)), -1);
    }

    #[test]
    fn test_weekday_monday_is_zero() {
        // 2017-06-12 was a Monday
        assert_eq!(weekday_of(ts(12, 10, 0)), 0);
        assert_eq!(weekday_of(ts(10, 10, 0)), 5);
        assert_eq!(weekday_of(ts(11, 10, 0)), 6);
    }

    #[test]
    fn test_parse_anchor_formats() {
        assert_eq!(parse_anchor(Some("2017-06-08 14:43")).unwrap(), ts(8, 14, 43));
        assert_eq!(parse_anchor(Some("2017-06-08")).unwrap(), ts(8, 0, 0));
        assert!(matches!(parse_anchor(Some("")), Err(ScoreError::Configuration(_))));
        assert!(matches!(parse_anchor(None), Err(ScoreError::Configuration(_))));
        assert!(matches!(parse_anchor(Some("June 8")), Err(ScoreError::Configuration(_))));
    }
}
