//! QueueStore - キューのスナップショットを 1 キーに保存・復元
//!
//! # 保存形式
//! `{"version": 1, "requests": [...]}` の JSON。
//! 旧形式（バージョンなしの配列そのもの）も読み込めます。
//!
//! # 破損への耐性
//! `load()` は失敗しません。キーが無い・壊れている・未知のバージョン、
//! いずれの場合も warn を出して空のキューを返します。

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{FailureKind, QueuedRequest};
use crate::ports::{KeyValueStorage, StorageError};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    requests: &'a [QueuedRequest],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Versioned {
        version: u32,
        requests: Vec<QueuedRequest>,
    },
    Legacy(Vec<QueuedRequest>),
}

/// Durable load/save of the whole queue under one key.
pub struct QueueStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl QueueStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Overwrite the stored snapshot.
    pub async fn save(&self, requests: &[QueuedRequest]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            requests,
        })?;
        self.storage.set(&self.key, bytes).await?;
        debug!(key = %self.key, count = requests.len(), "store: snapshot saved");
        Ok(())
    }

    /// Read the stored snapshot; never fails.
    pub async fn load(&self) -> Vec<QueuedRequest> {
        let bytes = match self.storage.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %self.key, "store: no snapshot yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    kind = %FailureKind::StorageFailure,
                    error = %e,
                    "store: failed to read snapshot; starting empty"
                );
                return Vec::new();
            }
        };

        match decode(&bytes) {
            Ok(requests) => {
                let requests = sanitize(requests);
                debug!(key = %self.key, count = requests.len(), "store: snapshot loaded");
                requests
            }
            Err(reason) => {
                warn!(
                    key = %self.key,
                    kind = %FailureKind::StorageFailure,
                    %reason,
                    "store: snapshot unreadable; starting empty"
                );
                Vec::new()
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<QueuedRequest>, String> {
    let snapshot: StoredSnapshot = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    match snapshot {
        StoredSnapshot::Versioned { version, requests } if version == SNAPSHOT_VERSION => {
            Ok(requests)
        }
        StoredSnapshot::Versioned { version, .. } => {
            Err(format!("unsupported snapshot version {version}"))
        }
        StoredSnapshot::Legacy(requests) => Ok(requests),
    }
}

/// Drop entries that break queue invariants (duplicate ids, exhausted or
/// zero retry budgets).
fn sanitize(requests: Vec<QueuedRequest>) -> Vec<QueuedRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|r| {
            if !seen.insert(r.id) {
                warn!(request_id = %r.id, "store: dropping duplicate entry");
                return false;
            }
            if r.max_retries == 0 || r.retry_count >= r.max_retries {
                warn!(
                    request_id = %r.id,
                    retry_count = r.retry_count,
                    max_retries = r.max_retries,
                    "store: dropping entry with no retries left"
                );
                return false;
            }
            true
        })
        .collect()
}
