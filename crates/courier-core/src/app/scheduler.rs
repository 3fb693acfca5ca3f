//! SyncTimer - 一定間隔で処理パスを起動する
//!
//! # 設計原則
//! - タイマーはパスの起動だけを行い、キューには触れない
//! - 停止は watch チャネルで通知（WorkerGroup と同じ方式）
//! - 最初の tick は 1 間隔後。遅れた tick はまとめず後ろにずらす

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Requests a processing pass. Must not block.
pub type PassTrigger = Arc<dyn Fn() + Send + Sync>;

/// Handle of a spawned background loop.
/// - `signal()` で停止を要求
/// - `stop_and_join()` で停止を待つ
pub(crate) struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(body(shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub(crate) fn signal(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub(crate) async fn stop_and_join(self) {
        self.signal();
        let _ = self.join.await;
    }
}

/// Runs `body` every `period` until shutdown is signalled.
pub(crate) async fn every<F, Fut>(
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut body: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => body().await,
        }
    }
}

/// Periodic pass trigger.
pub struct SyncTimer {
    trigger: PassTrigger,
    handle: Mutex<Option<LoopHandle>>,
}

impl SyncTimer {
    pub fn new(trigger: PassTrigger) -> Self {
        Self {
            trigger,
            handle: Mutex::new(None),
        }
    }

    /// Start ticking every `interval`. Returns `false` if already running or
    /// `interval` is zero.
    pub fn start(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("timer: refusing zero interval");
            return false;
        }
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }

        let trigger = Arc::clone(&self.trigger);
        *slot = Some(LoopHandle::spawn(move |rx| {
            every(interval, rx, move || {
                debug!("timer: tick");
                trigger();
                std::future::ready(())
            })
        }));
        debug!(interval_ms = interval.as_millis() as u64, "timer: started");
        true
    }

    /// Stop and wait for the loop to exit.
    pub async fn stop(&self) {
        let taken = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = taken {
            handle.stop_and_join().await;
            debug!("timer: stopped");
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for SyncTimer {
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
