//! Status - QueueManager の状態スナップショットとパス結果

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use crate::domain::PassSummary;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub is_online: bool,
    pub is_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_request_timestamp: Option<DateTime<Utc>>,
}

/// Why `process_queue` did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRunning,
    Offline,
    Empty,
    Disposed,
}

/// Result of one `process_queue` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Skipped { reason: SkipReason },
    Completed { summary: PassSummary },
}

impl PassOutcome {
    pub fn summary(&self) -> Option<&PassSummary> {
        match self {
            PassOutcome::Completed { summary } => Some(summary),
            PassOutcome::Skipped { .. } => None,
        }
    }
}
