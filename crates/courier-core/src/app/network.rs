//! NetworkMonitor - 接続状態の追跡
//!
//! # 設計原則
//! - 最初のプローブまではオフライン扱い
//! - offline → online の遷移でのみパスを起動する
//! - ポーリング間隔ごとに ConnectivityProbe を呼ぶ

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::scheduler::{LoopHandle, PassTrigger, every};
use crate::ports::ConnectivityProbe;

struct MonitorShared {
    probe: Arc<dyn ConnectivityProbe>,
    online: AtomicBool,
    on_online: PassTrigger,
}

impl MonitorShared {
    async fn refresh(&self) -> bool {
        let now_online = self.probe.is_reachable().await;
        let was_online = self.online.swap(now_online, Ordering::SeqCst);
        match (was_online, now_online) {
            (false, true) => {
                info!("network: online");
                (self.on_online)();
            }
            (true, false) => info!("network: offline"),
            _ => debug!(online = now_online, "network: unchanged"),
        }
        now_online
    }
}

pub struct NetworkMonitor {
    shared: Arc<MonitorShared>,
    poll_interval: Duration,
    handle: Mutex<Option<LoopHandle>>,
}

impl NetworkMonitor {
    /// `on_online` fires on every offline → online transition.
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        poll_interval: Duration,
        on_online: PassTrigger,
    ) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                probe,
                online: AtomicBool::new(false),
                on_online,
            }),
            poll_interval,
            handle: Mutex::new(None),
        }
    }

    /// Last observed state. Never blocks.
    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::SeqCst)
    }

    /// Probe now and update the state.
    pub async fn refresh(&self) -> bool {
        self.shared.refresh().await
    }

    /// Start polling. Returns `false` if already polling.
    pub fn start(&self) -> bool {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        let period = self.poll_interval;
        *slot = Some(LoopHandle::spawn(move |rx| {
            every(period, rx, move || {
                let shared = Arc::clone(&shared);
                async move {
                    shared.refresh().await;
                }
            })
        }));
        debug!(
            poll_interval_ms = period.as_millis() as u64,
            "network: polling started"
        );
        true
    }

    pub async fn stop(&self) {
        let taken = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = taken {
            handle.stop_and_join().await;
            debug!("network: polling stopped");
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.signal();
        }
    }
}
