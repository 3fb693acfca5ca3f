//! UreqTransport - ureq による HttpTransport 実装
//!
//! ureq はブロッキング API なので、送信は `spawn_blocking` の上で行います。

use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Blocking HTTP agent run on tokio's blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect_timeout)
                .build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || send_blocking(&agent, &request, timeout))
            .await
            .map_err(|e| TransportError::Unreachable(format!("transport task failed: {e}")))?
    }
}

fn send_blocking(
    agent: &ureq::Agent,
    request: &HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse, TransportError> {
    let mut req = agent
        .request(request.method.as_str(), &request.url)
        .timeout(timeout);
    for (name, value) in &request.headers {
        req = req.set(name, value);
    }

    let result = match &request.body {
        Some(body) => {
            let has_content_type = request
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                req = req.set("Content-Type", "application/json");
            }
            req.send_string(&body.to_string())
        }
        None => req.call(),
    };

    match result {
        Ok(response) => Ok(HttpResponse {
            status: response.status(),
        }),
        // ureq reports 4xx/5xx as errors; for us they are just statuses
        Err(ureq::Error::Status(status, _)) => Ok(HttpResponse { status }),
        Err(ureq::Error::Transport(transport)) => match transport.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                Err(TransportError::InvalidRequest(transport.to_string()))
            }
            _ => Err(TransportError::Unreachable(transport.to_string())),
        },
    }
}
