//! Error types for fitscore

use thiserror::Error;

use crate::types::StreamKind;

/// Errors that can occur while scoring wearable exports
#[derive(Debug, Error)]
pub enum ScoreError {
    /// A required per-time-range export file is absent.
    #[error("missing {stream} export for time range {time_range}")]
    MissingStream {
        stream: StreamKind,
        time_range: String,
    },

    /// A value could not be read as the number or code a column expects.
    ///
    /// Readers catch this per observation and skip the row.
    #[error("malformed {field} value: {value:?}")]
    MalformedValue { field: &'static str, value: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("date parse error: {0}")]
    DateParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoreError {
    pub(crate) fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        ScoreError::MalformedValue {
            field,
            value: value.into(),
        }
    }

    /// Whether this error only affects one time range rather than the participant
    pub fn is_time_range_scoped(&self) -> bool {
        !matches!(self, ScoreError::Configuration(_))
    }
}
