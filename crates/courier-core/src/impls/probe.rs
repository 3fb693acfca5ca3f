//! ConnectivityProbe 実装
//!
//! - **TcpProbe**: `host:port` に TCP 接続できるかで判定
//! - **ManualProbe**: ホストアプリ（やテスト）がフラグを切り替える

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::QueueConfig;
use crate::ports::ConnectivityProbe;

/// `TcpProbe` against `probe_addr` when configured, otherwise always online.
pub fn default_probe(config: &QueueConfig) -> Arc<dyn ConnectivityProbe> {
    match &config.probe_addr {
        Some(addr) => Arc::new(TcpProbe::new(addr.clone(), config.probe_timeout())),
        None => Arc::new(ManualProbe::new(true)),
    }
}

/// Reachable when a TCP connection to `addr` opens within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str())).await,
            Ok(Ok(_))
        )
    }
}

/// Connectivity flag flipped from outside.
///
/// Clone して片方をモニタに渡し、もう片方で状態を切り替えます。
#[derive(Debug, Clone)]
pub struct ManualProbe {
    online: Arc<AtomicBool>,
}

impl ManualProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
