//! Pipeline orchestration
//!
//! This module provides the public scoring API. It runs the stages in order
//! for one time range, then fans out over a participant's time ranges and
//! over a whole roster.
//!
//! Failures are scoped: a time range that cannot be scored becomes a record
//! carrying `import_error`, a participant without a usable anchor becomes
//! one such record, and the batch always continues.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::aligner::MinuteAligner;
use crate::cleaner::SignalCleaner;
use crate::config::ScoringConfig;
use crate::daily::{DailyAggregates, DailyAggregator};
use crate::day_index::DayIndexer;
use crate::emitter::{ScoreEmitter, ScoreRecord};
use crate::error::ScoreError;
use crate::export::{ExportCatalog, ExportReader, TimeRange};
use crate::roster::{Participant, Roster};
use crate::types::RawStreams;
use crate::weekly::{WeeklyRollup, WeeklySummary};

/// Aggregates of one scored time range
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRange {
    pub daily: DailyAggregates,
    pub weekly: WeeklySummary,
    /// Minute rows that entered aggregation
    pub minutes: usize,
    pub stuck_removed: usize,
    pub out_of_range_removed: usize,
}

/// Result of scoring a roster against an export catalog
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    /// Merged records, one per participant and event
    pub records: Vec<ScoreRecord>,
    /// Export files no roster participant consumed
    pub unprocessed_files: Vec<PathBuf>,
}

/// Runs the scoring stages with one configuration
#[derive(Debug, Clone)]
pub struct ScoringProcessor {
    config: ScoringConfig,
    cleaner: SignalCleaner,
    rollup: WeeklyRollup,
    emitter: ScoreEmitter,
}

impl Default for ScoringProcessor {
    fn default() -> Self {
        Self::build(ScoringConfig::default())
    }
}

impl ScoringProcessor {
    /// Create a processor, rejecting an invalid configuration
    pub fn new(config: ScoringConfig) -> Result<Self, ScoreError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ScoringConfig) -> Self {
        Self {
            cleaner: SignalCleaner::from_config(&config),
            rollup: WeeklyRollup::from_config(&config),
            emitter: ScoreEmitter::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn emitter(&self) -> &ScoreEmitter {
        &self.emitter
    }

    /// Score already-ingested streams against an anchor.
    ///
    /// Stages: clean heart rate, align minutes, index days, drop minutes
    /// outside the collection window, aggregate days, roll up weeks.
    pub fn score_streams(&self, anchor: NaiveDateTime, streams: &RawStreams) -> ScoredRange {
        let cleaned = self.cleaner.clean(&streams.heart_rate);
        let rows = MinuteAligner::align(&cleaned.samples, streams);

        let indexer = DayIndexer::new(anchor, self.config.day_boundary);
        let mut minutes = indexer.index(&rows);
        minutes.retain(|m| self.config.collection_window.contains(m.day));

        let daily = DailyAggregator::aggregate(&minutes);
        let weekly = self.rollup.rollup(&daily);

        ScoredRange {
            daily,
            weekly,
            minutes: minutes.len(),
            stuck_removed: cleaned.stuck_removed,
            out_of_range_removed: cleaned.out_of_range_removed,
        }
    }

    /// Read and score one time range of a participant
    pub fn score_time_range(
        &self,
        participant: &Participant,
        anchor: NaiveDateTime,
        range: &TimeRange,
    ) -> Result<ScoreRecord, ScoreError> {
        let (streams, stats) = ExportReader::read_time_range(range, &self.config.required_streams)?;
        if stats.total_skipped() > 0 {
            tracing::warn!(
                participant = %participant.id_redcap,
                time_range = %range.token,
                skipped = stats.total_skipped(),
                "skipped malformed export rows"
            );
        }

        let scored = self.score_streams(anchor, &streams);
        tracing::info!(
            participant = %participant.id_redcap,
            time_range = %range.token,
            stuck_removed = scored.stuck_removed,
            out_of_range_removed = scored.out_of_range_removed,
            minutes = scored.minutes,
            days = scored.daily.len(),
            "scored time range"
        );

        Ok(self.emitter.emit(
            &participant.id_redcap,
            &participant.redcap_event_name,
            &scored.daily,
            &scored.weekly,
        ))
    }

    /// Score every time range of a participant. Never fails: errors become
    /// records carrying `import_error`.
    pub fn score_participant(
        &self,
        participant: &Participant,
        ranges: &[TimeRange],
    ) -> Vec<ScoreRecord> {
        let id = &participant.id_redcap;
        let event = &participant.redcap_event_name;

        let anchor = match participant.anchor() {
            Ok(anchor) => anchor,
            Err(err) => {
                tracing::warn!(participant = %id, error = %err, "cannot score participant");
                return vec![self.emitter.error_record(id, event, &err)];
            }
        };

        ranges
            .iter()
            .map(|range| {
                self.score_time_range(participant, anchor, range)
                    .unwrap_or_else(|err| {
                        tracing::warn!(
                            participant = %id,
                            time_range = %range.token,
                            error = %err,
                            "time range not scored"
                        );
                        self.emitter.error_record(id, event, &err)
                    })
            })
            .collect()
    }

    /// Score every roster participant that has export files
    pub fn score_batch(&self, roster: &Roster, catalog: &ExportCatalog) -> BatchOutcome {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, participants = roster.len(), "scoring batch");

        let mut records = Vec::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for participant in roster.iter() {
            if catalog.files_for(&participant.id_redcap).is_none() {
                tracing::debug!(participant = %participant.id_redcap, "no export files");
                continue;
            }
            consumed.insert(participant.id_redcap.as_str());

            let ranges = catalog.time_ranges(&participant.id_redcap);
            tracing::info!(
                participant = %participant.id_redcap,
                event = %participant.redcap_event_name,
                time_ranges = ranges.len(),
                "scoring participant"
            );
            records.extend(self.score_participant(participant, &ranges));
        }

        let unprocessed_files: Vec<PathBuf> = catalog
            .all_files()
            .filter(|f| f.stream.is_none() || !consumed.contains(f.participant_id.as_str()))
            .map(|f| f.path.clone())
            .collect();
        for path in &unprocessed_files {
            tracing::warn!(%run_id, path = %path.display(), "unprocessed file");
        }

        let records = self.emitter.finalize(records);
        tracing::info!(%run_id, records = records.len(), "batch complete");

        BatchOutcome {
            run_id,
            records,
            unprocessed_files,
        }
    }
}
