//! Participant roster
//!
//! The roster is the clinical-data-capture export listing, per participant
//! and event, the date the device was issued. That date anchors study day 0.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::day_index::parse_anchor;
use crate::error::ScoreError;

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id_redcap: String,
    pub redcap_event_name: String,
    /// Device issuance date, `YYYY-MM-DD HH:MM`; empty when not yet issued
    #[serde(default)]
    pub fitc_device_dte: Option<String>,
}

impl Participant {
    /// Study anchor, or a configuration error if the issuance date is unusable
    pub fn anchor(&self) -> Result<NaiveDateTime, ScoreError> {
        parse_anchor(self.fitc_device_dte.as_deref())
    }
}

/// Participants in roster order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self { participants }
    }

    pub fn from_json(json: &str) -> Result<Self, ScoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ScoreError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
