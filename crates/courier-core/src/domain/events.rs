//! Events - 処理中に発生するイベント
//!
//! コールバック（on_sync / on_success / on_error）と同じ情報を、
//! タグ付きの 1 本のストリームとしても配信します。

use serde::Serialize;

use super::outcome::DeliveryError;
use super::request::QueuedRequest;

/// QueueEvent は `QueueManager::subscribe()` で受け取れるイベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// An attempt is about to start.
    Sync { request: QueuedRequest },

    /// Delivered and removed.
    Success { request: QueuedRequest },

    /// Removed without delivery.
    Error {
        request: QueuedRequest,
        error: DeliveryError,
    },

    /// A processing pass finished (or stopped early because it went offline).
    PassCompleted { summary: PassSummary },
}

/// What one processing pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Attempts started (one per `Sync` event).
    pub attempted: usize,
    pub delivered: usize,
    /// Retryable failures that stay queued.
    pub retried: usize,
    /// Terminal failures plus exhausted retries.
    pub dropped: usize,
    /// Skipped because their backoff has not elapsed.
    pub deferred: usize,
    /// Dequeued or evicted after the pass started; never sent.
    pub removed: usize,
    /// Stopped early because the network went away.
    pub aborted_offline: bool,
}
