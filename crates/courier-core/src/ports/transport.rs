//! HttpTransport port - 1 回分の HTTP 送信
//!
//! 分類（成功 / 再試行 / 終端）は `RequestExecutor` の責務で、
//! Transport はステータスコードか送信エラーを返すだけです。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::HttpMethod;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the server (DNS, refused, reset, TLS, ...).
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// No response within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The request itself is malformed (bad URL, unknown scheme).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Fully resolved request ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// Only the status matters to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

/// HttpTransport はリクエストを 1 回だけ送る
///
/// # 設計原則
/// - 内部でリトライしない
/// - 4xx/5xx も `Ok(HttpResponse)` として返す（エラーではない）
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}
