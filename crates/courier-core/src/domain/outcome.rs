//! Outcome model: how one delivery attempt ended, and why a request left the
//! queue without being delivered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single HTTP attempt.
///
/// The executor produces this; the queue manager owns all retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    /// 2xx.
    Success { status: u16 },

    /// Transport failure, timeout, 5xx or 429.
    Retryable { status: Option<u16>, reason: String },

    /// Any other 4xx, or a request that cannot be sent at all.
    Terminal { status: Option<u16>, reason: String },
}

impl DeliveryOutcome {
    pub fn retryable(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Retryable {
            status,
            reason: reason.into(),
        }
    }

    pub fn terminal(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Terminal {
            status,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status } => Some(*status),
            Self::Retryable { status, .. } | Self::Terminal { status, .. } => *status,
        }
    }
}

/// Error taxonomy reported to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Went offline mid-pass. Items stay queued.
    NetworkUnavailable,
    /// Transient failure; eligible for another pass.
    Retryable,
    /// Non-retryable 4xx (or unsendable request). Removed immediately.
    Terminal,
    /// `retry_count` reached `max_retries`. Removed.
    RetriesExhausted,
    /// Snapshot load/save failed. Queue keeps running in memory.
    StorageFailure,
    /// Dropped by admission control to stay under `max_queue_size`.
    Evicted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NetworkUnavailable => "network unavailable",
            FailureKind::Retryable => "retryable",
            FailureKind::Terminal => "terminal",
            FailureKind::RetriesExhausted => "retries exhausted",
            FailureKind::StorageFailure => "storage failure",
            FailureKind::Evicted => "evicted",
        };
        f.write_str(s)
    }
}

/// Payload of the `on_error` callback: why a request left the queue undelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryError {
    pub kind: FailureKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn terminal(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Terminal, status, reason)
    }

    pub fn retries_exhausted(status: Option<u16>, reason: &str, attempts: u32) -> Self {
        Self::new(
            FailureKind::RetriesExhausted,
            status,
            format!("gave up after {attempts} attempts: {reason}"),
        )
    }

    pub fn evicted(max_queue_size: usize) -> Self {
        Self::new(
            FailureKind::Evicted,
            None,
            format!("evicted to keep the queue at {max_queue_size} entries"),
        )
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
