//! Durable `Run` domain type — see the storage crate for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Utility,
    Controller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
    Cancelled,
}

/// One durable attempt at playing a playlist in a specific order.
/// Immutable once created: a reshuffle creates a new [`Run`], it never
/// mutates `order` in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub user_id: i64,
    pub playlist_id: String,
    pub mode: Mode,
    pub order: Vec<String>,
    pub cursor: usize,
    pub queued_until_index: usize,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// `0 <= cursor <= |order|`; `cursor` equals `|order|` when the run
    /// has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.order.len()
    }

    #[must_use]
    pub fn total_tracks(&self) -> usize {
        self.order.len()
    }

    /// The URI the controller currently intends to be playing, or
    /// `None` once the run is complete.
    #[must_use]
    pub fn expected_uri(&self) -> Option<&str> {
        self.order.get(self.cursor).map(String::as_str)
    }
}
