//! ScriptedTransport - テスト用の HttpTransport
//!
//! 応答を順番に返し、送られたリクエストを記録します。
//! `gate` を設定すると、応答前に Notify を待つので「パス実行中」を作れます。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<u16, TransportError>>>,
    fallback: u16,
    calls: Mutex<Vec<HttpRequest>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    /// Always answers `status` once the script runs out.
    pub fn always(status: u16) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: status,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn then(self, response: Result<u16, TransportError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(status)) => Ok(HttpResponse { status }),
            Some(Err(e)) => Err(e),
            None => Ok(HttpResponse {
                status: self.fallback,
            }),
        }
    }
}
