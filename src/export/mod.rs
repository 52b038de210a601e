//! Export file discovery and ingestion
//!
//! Export files for one participant are recognised by name: the participant
//! id leads the file name, a stream marker identifies the measure, and a
//! trailing `<start>_<end>` token identifies the time range. All files
//! sharing a time-range token are scored together.

mod discovery;
mod reader;

pub use discovery::{group_time_ranges, ExportCatalog, ExportFile, TimeRange};
pub use reader::{parse_export_timestamp, ExportReader, IngestStats};
