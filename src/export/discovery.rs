use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::ScoreError;
use crate::types::StreamKind;

/// One export CSV, classified by its file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    pub path: PathBuf,
    pub participant_id: String,
    /// Trailing `<start>_<end>` token of the file stem
    pub date_range: String,
    /// None for exports this engine does not consume
    pub stream: Option<StreamKind>,
}

impl ExportFile {
    /// Classify a path, or None if its name does not follow the export convention.
    ///
    /// Example: `NDAR_INV0AU5R8NA_30secondSleepStages_20160308_20180408.csv`
    pub fn from_path(path: &Path) -> Option<ExportFile> {
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            return None;
        }
        let file_name = path.file_name()?.to_str()?;
        let stem = path.file_stem()?.to_str()?;
        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 3 {
            return None;
        }

        let first = tokens[0].trim();
        let participant_id = if first == "NDAR" {
            format!("{}_{}", first, tokens[1].trim())
        } else {
            first.to_string()
        };
        if participant_id.is_empty() {
            return None;
        }

        let date_range = format!("{}_{}", tokens[tokens.len() - 2], tokens[tokens.len() - 1]);

        Some(ExportFile {
            path: path.to_path_buf(),
            participant_id,
            date_range,
            stream: StreamKind::from_file_name(file_name),
        })
    }
}

/// All export files of one participant sharing a date-range token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub token: String,
    pub files: Vec<ExportFile>,
}

impl TimeRange {
    /// First file of this range carrying the given stream
    pub fn file_for(&self, kind: StreamKind) -> Option<&ExportFile> {
        self.files.iter().find(|f| f.stream == Some(kind))
    }

    /// Required streams without a file in this range
    pub fn missing_streams(&self, required: &[StreamKind]) -> Vec<StreamKind> {
        required
            .iter()
            .copied()
            .filter(|kind| self.file_for(*kind).is_none())
            .collect()
    }
}

/// Group one participant's files by date-range token, in first-seen order
pub fn group_time_ranges(files: &[ExportFile]) -> Vec<TimeRange> {
    let mut ranges: Vec<TimeRange> = Vec::new();
    for file in files {
        match ranges.iter_mut().find(|r| r.token == file.date_range) {
            Some(range) => range.files.push(file.clone()),
            None => ranges.push(TimeRange {
                token: file.date_range.clone(),
                files: vec![file.clone()],
            }),
        }
    }
    ranges
}

/// Export files found under an input directory, keyed by participant id
#[derive(Debug, Clone, Default)]
pub struct ExportCatalog {
    participants: BTreeMap<String, Vec<ExportFile>>,
}

impl ExportCatalog {
    /// Recursively collect every export CSV below `root`
    pub fn discover(root: &Path) -> Result<Self, ScoreError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            match ExportFile::from_path(entry.path()) {
                Some(file) => files.push(file),
                None => {
                    if entry.path().extension().and_then(|e| e.to_str()) == Some("csv") {
                        tracing::warn!(
                            path = %entry.path().display(),
                            "skipping csv with unrecognised name"
                        );
                    }
                }
            }
        }
        tracing::info!(root = %root.display(), files = files.len(), "discovered export files");
        Ok(Self::from_files(files))
    }

    pub fn from_files(files: impl IntoIterator<Item = ExportFile>) -> Self {
        let mut participants: BTreeMap<String, Vec<ExportFile>> = BTreeMap::new();
        for file in files {
            participants
                .entry(file.participant_id.clone())
                .or_default()
                .push(file);
        }
        Self { participants }
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.keys().map(String::as_str)
    }

    pub fn files_for(&self, participant_id: &str) -> Option<&[ExportFile]> {
        self.participants.get(participant_id).map(Vec::as_slice)
    }

    pub fn time_ranges(&self, participant_id: &str) -> Vec<TimeRange> {
        self.files_for(participant_id)
            .map(group_time_ranges)
            .unwrap_or_default()
    }

    pub fn all_files(&self) -> impl Iterator<Item = &ExportFile> {
        self.participants.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> ExportFile {
        ExportFile::from_path(Path::new(name)).unwrap()
    }

    #[test]
    fn test_ndar_participant_id_keeps_two_tokens() {
        let f = file("NDAR_INV0AU5R8NA_30secondSleepStages_20160308_20180408.csv");
        assert_eq!(f.participant_id, "NDAR_INV0AU5R8NA");
        assert_eq!(f.date_range, "20160308_20180408");
        assert_eq!(f.stream, Some(StreamKind::SleepStages));
    }

    #[test]
    fn test_plain_participant_id() {
        let f = file("P001_heartrate_1min_20170601_20170630.csv");
        assert_eq!(f.participant_id, "P001");
        assert_eq!(f.stream, Some(StreamKind::HeartRate));
    }

    #[test]
    fn test_rejects_non_export_names() {
        assert!(ExportFile::from_path(Path::new("notes.csv")).is_none());
        let text_file = Path::new("P001_heartrate_1min_20170601_20170630.txt");
        assert!(ExportFile::from_path(text_file).is_none());
    }

    #[test]
    fn test_unknown_measure_is_kept_unclassified() {
        let f = file("P001_battery_20170601_20170630.csv");
        assert_eq!(f.stream, None);
    }

    #[test]
    fn test_group_time_ranges_by_token() {
        let files = vec![
            file("P001_heartrate_1min_20170601_20170630.csv"),
            file("P001_minuteStepsNarrow_20170601_20170630.csv"),
            file("P001_heartrate_1min_20170701_20170730.csv"),
        ];
        let ranges = group_time_ranges(&files);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].token, "20170601_20170630");
        assert_eq!(ranges[0].files.len(), 2);
        assert_eq!(ranges[1].token, "20170701_20170730");

        let missing = ranges[1].missing_streams(&StreamKind::ALL);
        assert_eq!(missing.len(), 5);
        assert!(!missing.contains(&StreamKind::HeartRate));
    }

    #[test]
    fn test_catalog_groups_by_participant() {
        let catalog = ExportCatalog::from_files(vec![
            file("P002_heartrate_1min_20170601_20170630.csv"),
            file("P001_heartrate_1min_20170601_20170630.csv"),
            file("P001_minuteSleep_20170601_20170630.csv"),
        ]);
        let ids: Vec<&str> = catalog.participant_ids().collect();
        assert_eq!(ids, vec!["P001", "P002"]);
        assert_eq!(catalog.files_for("P001").unwrap().len(), 2);
        assert_eq!(catalog.time_ranges("P001").len(), 1);
        assert!(catalog.time_ranges("P404").is_empty());
    }
}
