//! Row types for the `data` and `sync_queue` tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted key/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub data: Value,
    /// Unix milliseconds of the last write.
    pub timestamp: i64,
    /// `true` once every queued mutation for this key has been replayed.
    pub synced: bool,
}

/// Kind of mutation recorded in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending mutation awaiting remote replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Auto-incrementing id; iteration order is id order.
    pub id: i64,
    pub key: String,
    pub action: SyncAction,
    pub timestamp: i64,
}
