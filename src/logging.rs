//! Tracing subscriber setup for binaries

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LogFormat;
use crate::error::ScoreError;

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_subscriber(level: &str, format: LogFormat) -> Result<(), ScoreError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Text => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    result.map_err(|e| ScoreError::Configuration(format!("failed to install logger: {e}")))
}
