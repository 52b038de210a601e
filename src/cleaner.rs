//! Heart-rate artifact removal
//!
//! Two filters run over the raw heart-rate stream, in this order:
//! - stuck-sensor runs: any run of `stuck_run_length` or more identical
//!   consecutive values is dropped whole
//! - range: values outside `[min_bpm, max_bpm]` are dropped
//!
//! Run detection sees the raw values in timestamp order, before the range
//! filter, so an out-of-range sample never splits or joins a run.

use crate::config::ScoringConfig;
use crate::types::{truncate_to_minute, HeartRateSample, RawSample};

/// Result of cleaning one heart-rate stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedHeartRate {
    /// Time-ordered samples at minute resolution
    pub samples: Vec<HeartRateSample>,
    pub stuck_removed: usize,
    pub out_of_range_removed: usize,
}

/// Heart-rate cleaner
#[derive(Debug, Clone, Copy)]
pub struct SignalCleaner {
    stuck_run_length: usize,
    min_bpm: f64,
    max_bpm: f64,
}

impl Default for SignalCleaner {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl SignalCleaner {
    pub fn new(stuck_run_length: usize, min_bpm: f64, max_bpm: f64) -> Self {
        Self {
            stuck_run_length: stuck_run_length.max(1),
            min_bpm,
            max_bpm,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.stuck_run_length,
            config.min_heart_rate,
            config.max_heart_rate,
        )
    }

    /// Clean a raw heart-rate stream
    pub fn clean(&self, raw: &[RawSample<f64>]) -> CleanedHeartRate {
        let mut ordered: Vec<RawSample<f64>> = raw.to_vec();
        // stable, so equal timestamps keep file order
        ordered.sort_by_key(|s| s.timestamp);

        let keep = self.stuck_run_mask(&ordered);
        let stuck_removed = keep.iter().filter(|k| !**k).count();

        let mut out_of_range_removed = 0;
        let mut samples = Vec::with_capacity(ordered.len() - stuck_removed);
        for (sample, kept) in ordered.iter().zip(keep) {
            if !kept {
                continue;
            }
            if !self.in_range(sample.value) {
                out_of_range_removed += 1;
                continue;
            }
            samples.push(HeartRateSample {
                minute: truncate_to_minute(sample.timestamp),
                bpm: sample.value,
            });
        }

        CleanedHeartRate {
            samples,
            stuck_removed,
            out_of_range_removed,
        }
    }

    fn in_range(&self, bpm: f64) -> bool {
        bpm >= self.min_bpm && bpm <= self.max_bpm
    }

    /// `false` for every sample belonging to a run that is too long
    fn stuck_run_mask(&self, samples: &[RawSample<f64>]) -> Vec<bool> {
        let mut keep = vec![true; samples.len()];
        let mut run_start = 0;

        for idx in 1..=samples.len() {
            let run_continues =
                idx < samples.len() && samples[idx].value == samples[run_start].value;
            if run_continues {
                continue;
            }
            if idx - run_start >= self.stuck_run_length {
                keep[run_start..idx].iter_mut().for_each(|k| *k = false);
            }
            run_start = idx;
        }

        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 6, 9)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn series(values: &[f64]) -> Vec<RawSample<f64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawSample::new(start() + Duration::minutes(i as i64), *v))
            .collect()
    }

    fn bpms(cleaned: &CleanedHeartRate) -> Vec<f64> {
        cleaned.samples.iter().map(|s| s.bpm).collect()
    }

    #[test]
    fn test_run_of_ten_is_dropped_entirely() {
        let raw = series(&[70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 75.0]);
        let cleaned = SignalCleaner::default().clean(&raw);

        assert_eq!(bpms(&cleaned), vec![75.0]);
        assert_eq!(cleaned.stuck_removed, 10);
        assert_eq!(cleaned.samples[0].minute, start() + Duration::minutes(10));
    }

    #[test]
    fn test_run_of_nine_is_kept() {
        let raw = series(&[70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 75.0]);
        let cleaned = SignalCleaner::default().clean(&raw);

        assert_eq!(cleaned.samples.len(), 10);
        assert_eq!(cleaned.stuck_removed, 0);
    }

    #[test]
    fn test_trailing_run_is_dropped() {
        let mut values = vec![80.0];
        values.extend(std::iter::repeat(66.0).take(12));
        let cleaned = SignalCleaner::default().clean(&series(&values));

        assert_eq!(bpms(&cleaned), vec![80.0]);
        assert_eq!(cleaned.stuck_removed, 12);
    }

    #[test]
    fn test_range_filter_is_inclusive() {
        let raw = series(&[49.0, 50.0, 120.0, 210.0, 211.0]);
        let cleaned = SignalCleaner::default().clean(&raw);

        assert_eq!(bpms(&cleaned), vec![50.0, 120.0, 210.0]);
        assert_eq!(cleaned.out_of_range_removed, 2);
    }

    #[test]
    fn test_out_of_range_values_do_not_break_runs() {
        // ten 40s are a stuck run even though each is also out of range
        let mut values = vec![40.0; 10];
        values.push(90.0);
        let cleaned = SignalCleaner::default().clean(&series(&values));

        assert_eq!(bpms(&cleaned), vec![90.0]);
        assert_eq!(cleaned.stuck_removed, 10);
        assert_eq!(cleaned.out_of_range_removed, 0);
    }

    #[test]
    fn test_seconds_are_truncated_and_order_restored() {
        let raw = vec![
            RawSample::new(start() + Duration::seconds(90), 81.0),
            RawSample::new(start() + Duration::seconds(15), 80.0),
        ];
        let cleaned = SignalCleaner::default().clean(&raw);

        assert_eq!(cleaned.samples[0].minute, start());
        assert_eq!(cleaned.samples[0].bpm, 80.0);
        assert_eq!(cleaned.samples[1].minute, start() + Duration::minutes(1));
    }

    #[test]
    fn test_no_survivor_sits_in_a_long_run_or_out_of_range() {
        let values: Vec<f64> = (0..200)
            .map(|i| match i % 37 {
                0..=11 => 64.0,
                12 => 230.0,
                13 => 45.0,
                n => 60.0 + n as f64,
            })
            .collect();
        let cleaned = SignalCleaner::default().clean(&series(&values));

        for window in cleaned.samples.windows(10) {
            assert!(window.iter().any(|s| s.bpm != window[0].bpm));
        }
        assert!(cleaned.samples.iter().all(|s| (50.0..=210.0).contains(&s.bpm)));
    }
}
