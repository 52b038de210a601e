//! Scoring configuration
//!
//! Thresholds, windows and naming used by the pipeline. Every field has a
//! default so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ScoreError;
use crate::types::{DayWindow, StreamKind};

/// How timestamps are mapped to study days
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBoundary {
    /// Whole 24-hour periods elapsed since the anchor timestamp (floored)
    #[default]
    Elapsed,
    /// Calendar-date difference between the minute and the anchor
    Calendar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for a scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_field_prefix")]
    pub field_prefix: String,
    #[serde(default)]
    pub day_boundary: DayBoundary,
    #[serde(default = "default_stuck_run_length")]
    pub stuck_run_length: usize,
    #[serde(default = "default_min_heart_rate")]
    pub min_heart_rate: f64,
    #[serde(default = "default_max_heart_rate")]
    pub max_heart_rate: f64,
    #[serde(default = "default_wear_minutes_min")]
    pub wear_minutes_min: u32,
    #[serde(default = "default_wear_minutes_max")]
    pub wear_minutes_max: u32,
    #[serde(default = "default_sleep_minutes_min")]
    pub sleep_minutes_min: f64,
    /// Minutes outside this window never reach the aggregators
    #[serde(default = "default_collection_window")]
    pub collection_window: DayWindow,
    #[serde(default = "default_required_streams")]
    pub required_streams: Vec<StreamKind>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_field_prefix() -> String {
    "fits_ss_".to_string()
}

fn default_stuck_run_length() -> usize {
    10
}

fn default_min_heart_rate() -> f64 {
    50.0
}

fn default_max_heart_rate() -> f64 {
    210.0
}

fn default_wear_minutes_min() -> u32 {
    600
}

fn default_wear_minutes_max() -> u32 {
    1200
}

fn default_sleep_minutes_min() -> f64 {
    300.0
}

fn default_collection_window() -> DayWindow {
    DayWindow::open(-1, 22)
}

fn default_required_streams() -> Vec<StreamKind> {
    StreamKind::ALL.to_vec()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            field_prefix: default_field_prefix(),
            day_boundary: DayBoundary::default(),
            stuck_run_length: default_stuck_run_length(),
            min_heart_rate: default_min_heart_rate(),
            max_heart_rate: default_max_heart_rate(),
            wear_minutes_min: default_wear_minutes_min(),
            wear_minutes_max: default_wear_minutes_max(),
            sleep_minutes_min: default_sleep_minutes_min(),
            collection_window: default_collection_window(),
            required_streams: default_required_streams(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl ScoringConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ScoreError> {
        let config: ScoringConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_path(path: &Path) -> Result<Self, ScoreError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.field_prefix.is_empty() {
            return Err(ScoreError::Configuration(
                "field_prefix must not be empty".to_string(),
            ));
        }
        if self.stuck_run_length == 0 {
            return Err(ScoreError::Configuration(
                "stuck_run_length must be at least 1".to_string(),
            ));
        }
        if self.min_heart_rate > self.max_heart_rate {
            return Err(ScoreError::Configuration(format!(
                "min_heart_rate {} exceeds max_heart_rate {}",
                self.min_heart_rate, self.max_heart_rate
            )));
        }
        if self.wear_minutes_min > self.wear_minutes_max {
            return Err(ScoreError::Configuration(format!(
                "wear_minutes_min {} exceeds wear_minutes_max {}",
                self.wear_minutes_min, self.wear_minutes_max
            )));
        }
        if self.collection_window.after >= self.collection_window.before {
            return Err(ScoreError::Configuration(
                "collection_window is empty".to_string(),
            ));
        }
        Ok(())
    }
}
