//! fitscore - Scoring engine for per-minute wearable exports
//!
//! fitscore turns a participant's per-minute export files into study outcome
//! scores through a deterministic pipeline: heart-rate cleaning → minute
//! alignment → study-day indexing → daily aggregation → weekly rollup →
//! score emission.
//!
//! ## Modules
//!
//! - **Export**: discover export files on disk and read them into raw samples
//! - **Core**: the stage processors, one module each
//! - **Pipeline**: [`ScoringProcessor`], scoring one time range, one
//!   participant or a whole roster

pub mod aligner;
pub mod cleaner;
pub mod config;
pub mod daily;
pub mod day_index;
pub mod emitter;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod roster;
pub mod types;
pub mod weekly;

pub use config::{DayBoundary, LogFormat, ScoringConfig};
pub use emitter::{merge_records, ScoreEmitter, ScoreRecord, ScoreValue};
pub use error::ScoreError;
pub use export::{ExportCatalog, ExportReader, TimeRange};
pub use pipeline::{BatchOutcome, ScoredRange, ScoringProcessor};
pub use roster::{Participant, Roster};

/// fitscore version
pub const FITSCORE_VERSION: &str = env!("CARGO_PKG_VERSION");
