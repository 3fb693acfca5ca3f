//! Request identifiers.
//!
//! # ULID ベースの ID
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序で並ぶ
//! - **ランダム部分**: 同一ミリ秒内でも衝突しない
//!
//! Display では `req-` プレフィックスを付けます。パース時はプレフィックスの
//! 有無どちらも受け付けます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::CourierError;

const PREFIX: &str = "req-";

/// Identifier of a queued request. Assigned at enqueue, never reused.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Milliseconds since the Unix epoch encoded in the time part.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl From<Ulid> for RequestId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix(PREFIX).unwrap_or(raw);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|e| CourierError::InvalidId(format!("{s:?}: {e}")))
    }
}
