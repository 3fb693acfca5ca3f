//! RequestExecutor - 1 回の HTTP 試行と結果の分類
//!
//! # 分類
//! - 2xx → Success
//! - 送信失敗 / タイムアウト / 5xx / 429 → Retryable
//! - その他の 4xx（と送れないリクエスト）→ Terminal
//!
//! リトライ回数の管理は QueueManager の責務です。Executor は呼び出し間で
//! 状態を持ちません。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{DeliveryOutcome, QueuedRequest};
use crate::ports::{HttpRequest, HttpTransport, TransportError};

pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    base_url: Option<String>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
        base_url: Option<String>,
    ) -> Self {
        Self {
            transport,
            timeout,
            base_url,
        }
    }

    /// One attempt, bounded by the timeout. Never retries.
    pub async fn execute(&self, request: &QueuedRequest) -> DeliveryOutcome {
        let url = match resolve_url(self.base_url.as_deref(), &request.endpoint) {
            Ok(url) => url,
            Err(reason) => return DeliveryOutcome::terminal(None, reason),
        };
        let http = HttpRequest {
            method: request.method,
            url,
            headers: request.headers.clone(),
            body: request.body.clone(),
        };

        let sent =
            tokio::time::timeout(self.timeout, self.transport.send(http, self.timeout)).await;
        let outcome = match sent {
            Err(_) => DeliveryOutcome::retryable(
                None,
                TransportError::Timeout(self.timeout).to_string(),
            ),
            Ok(Err(TransportError::InvalidRequest(reason))) => {
                DeliveryOutcome::terminal(None, reason)
            }
            Ok(Err(e)) => DeliveryOutcome::retryable(None, e.to_string()),
            Ok(Ok(response)) => classify_status(response.status),
        };

        debug!(
            request_id = %request.id,
            method = %request.method,
            endpoint = %request.endpoint,
            status = ?outcome.status(),
            success = outcome.is_success(),
            "executor: attempt finished"
        );
        outcome
    }
}

/// Map an HTTP status onto the retry classes.
pub fn classify_status(status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Success { status },
        429 => DeliveryOutcome::retryable(Some(status), "too many requests"),
        500..=599 => DeliveryOutcome::retryable(Some(status), "server error"),
        400..=499 => DeliveryOutcome::terminal(Some(status), "client error"),
        _ => DeliveryOutcome::terminal(Some(status), "unexpected status"),
    }
}

/// Absolute endpoints pass through; `/path` is joined onto `base_url`.
pub fn resolve_url(base_url: Option<&str>, endpoint: &str) -> Result<String, String> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(endpoint.to_string());
    }
    match base_url {
        Some(base) if endpoint.starts_with('/') => {
            Ok(format!("{}{}", base.trim_end_matches('/'), endpoint))
        }
        Some(_) => Err(format!("endpoint {endpoint:?} is not a path")),
        None => Err(format!("relative endpoint {endpoint:?} without base_url")),
    }
}
