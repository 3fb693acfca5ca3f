//! QueueManager - オフラインキューの中核
//!
//! # 責務
//! - 受付制御（上限を超える前に古い low から追い出す）
//! - 優先度 + FIFO の並び順
//! - 処理パスの単一実行（AtomicBool + drop guard）
//! - リトライ回数の管理とコールバック配信
//!
//! # パスの起動元
//! 1. `enqueue`（オンラインかつ処理中でなければ）
//! 2. NetworkMonitor の offline → online 遷移
//! 3. SyncTimer の tick
//!
//! どれも同じ `process_queue` を呼び、実行中なら何もしません。
//!
//! # ロック
//! - `state`: 同期 Mutex。await を跨いで保持しない
//! - `persist_lock`: スナップショット取得から保存までを直列化し、
//!   書き込み順 = スナップショット順を保つ

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};

use super::executor::RequestExecutor;
use super::listeners::Listeners;
use super::network::NetworkMonitor;
use super::retry::RetryPolicy;
use super::scheduler::{PassTrigger, SyncTimer};
use super::status::{PassOutcome, PassSummary, QueueStatus, SkipReason};
use super::store::QueueStore;
use crate::config::QueueConfig;
use crate::domain::{
    DeliveryError, DeliveryOutcome, FailureKind, QueueEvent, QueueState, QueuedRequest,
    RequestId, RequestSpec,
};
use crate::error::CourierError;
use crate::ports::{Clock, IdGenerator};

/// Handle to a running queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: QueueConfig,
    pub(crate) state: Mutex<QueueState>,
    pub(crate) persist_lock: tokio::sync::Mutex<()>,
    pub(crate) store: QueueStore,
    pub(crate) executor: RequestExecutor,
    pub(crate) retry: RetryPolicy,
    pub(crate) network: NetworkMonitor,
    pub(crate) timer: SyncTimer,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) listeners: Listeners,
    pub(crate) processing: AtomicBool,
    pub(crate) pass_done: Notify,
    pub(crate) restored: AtomicBool,
    pub(crate) initialized: AtomicBool,
    pub(crate) disposed: AtomicBool,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the processing flag when the pass ends, even on panic.
struct ProcessingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(inner: &'a Inner) -> Option<Self> {
        inner
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { inner })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.inner.processing.store(false, Ordering::SeqCst);
        self.inner.pass_done.notify_waiters();
    }
}

/// Per-request result of a pass, applied to the live queue once the pass ends.
enum Change {
    Remove,
    Retry {
        retry_count: u32,
        next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    },
}

/// Trigger that starts a background pass as long as the manager is alive.
pub(crate) fn pass_trigger(inner: Weak<Inner>) -> PassTrigger {
    Arc::new(move || {
        if let Some(inner) = inner.upgrade() {
            QueueManager { inner }.kick();
        }
    })
}

impl QueueManager {
    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Load the stored snapshot and merge it into the live queue without
    /// starting any background work. Calling it again is a no-op.
    ///
    /// Every mutating operation restores first, so nothing written before
    /// `init` overwrites the stored snapshot.
    pub async fn restore(&self) {
        if self.inner.restored.swap(true, Ordering::SeqCst) {
            return;
        }

        let loaded = self.inner.store.load().await;
        let evicted = {
            let mut state = self.inner.lock_state();
            // requests enqueued before the restore stay, after the stored ones
            let mut merged = loaded;
            for request in state.to_vec() {
                if !merged.iter().any(|r| r.id == request.id) {
                    merged.push(request);
                }
            }
            *state = QueueState::from_requests(merged);
            state.shrink_to(self.inner.config.max_queue_size)
        };
        self.report_evicted(&evicted);
        self.persist().await;
    }

    /// Restore, probe connectivity once, then start the network monitor and
    /// the sync timer. Calling it again is a no-op.
    pub async fn init(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.restore().await;
        let size = self.inner.lock_state().len();

        let was_online = self.inner.network.is_online();
        let online = self.inner.network.refresh().await;
        self.inner.network.start();
        self.inner.timer.start(self.inner.config.sync_interval());

        // an offline → online transition already kicked a pass
        if was_online && online && size > 0 {
            self.kick();
        }
        info!(size, online, "queue: initialized");
    }

    /// Stop the monitor and timer, let a running pass finish, and write a
    /// final snapshot. Calling it again is a no-op.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.timer.stop().await;
        self.inner.network.stop().await;
        loop {
            let done = self.inner.pass_done.notified();
            if !self.is_processing() {
                break;
            }
            done.await;
        }
        self.persist().await;
        info!(size = self.inner.lock_state().len(), "queue: disposed");
    }

    /// Validate, admit and persist a request. Starts a background pass when
    /// online and idle. Fails only on validation.
    pub async fn enqueue(&self, spec: RequestSpec) -> Result<RequestId, CourierError> {
        spec.validate(self.inner.config.base_url.as_deref())?;
        self.restore().await;

        let id = self.inner.ids.generate_request_id();
        let request = QueuedRequest::from_spec(
            id,
            spec,
            self.inner.clock.now(),
            self.inner.config.default_max_retries,
        );
        debug!(
            request_id = %id,
            endpoint = %request.endpoint,
            priority = %request.priority,
            max_retries = request.max_retries,
            "queue: enqueued"
        );

        let evicted = {
            let mut state = self.inner.lock_state();
            let evicted = state.admit(self.inner.config.max_queue_size);
            state.push(request);
            evicted
        };
        self.report_evicted(&evicted);
        self.persist().await;

        if self.inner.network.is_online() && !self.is_processing() {
            self.kick();
        }
        Ok(id)
    }

    /// Remove a request by id. Returns whether it was queued.
    pub async fn dequeue(&self, id: &RequestId) -> bool {
        self.restore().await;
        let removed = self.inner.lock_state().remove(id);
        match removed {
            Some(request) => {
                info!(request_id = %id, endpoint = %request.endpoint, "queue: dequeued");
                self.persist().await;
                true
            }
            None => {
                debug!(request_id = %id, "queue: dequeue of unknown id");
                false
            }
        }
    }

    /// Drop everything. Returns how many requests were removed.
    pub async fn clear_queue(&self) -> usize {
        self.restore().await;
        let removed = self.inner.lock_state().clear();
        self.persist().await;
        info!(removed, "queue: cleared");
        removed
    }

    /// Copy of the live queue in processing order.
    pub fn get_queue(&self) -> Vec<QueuedRequest> {
        self.inner.lock_state().to_vec()
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let state = self.inner.lock_state();
        QueueStatus {
            size: state.len(),
            is_online: self.inner.network.is_online(),
            is_processing: self.is_processing(),
            oldest_request_timestamp: state.oldest_timestamp(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    /// Probe connectivity now. Going online starts a pass.
    pub async fn check_connectivity(&self) -> bool {
        self.inner.network.refresh().await
    }

    /// Stream of every callback as a [`QueueEvent`], plus pass summaries.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.listeners.subscribe()
    }

    /// Run one pass in the background.
    pub fn kick(&self) {
        if self.is_processing() || self.is_disposed() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.process_queue().await;
        });
    }

    /// Attempt every ready request once, in priority order.
    ///
    /// Does nothing while another pass runs, while offline, on an empty queue,
    /// or after [`dispose`](Self::dispose). Stops early if the network drops;
    /// untouched requests stay. Requests dequeued or evicted while the pass
    /// runs are skipped, not sent.
    pub async fn process_queue(&self) -> PassOutcome {
        let Some(guard) = ProcessingGuard::acquire(&self.inner) else {
            debug!("queue: pass already running");
            return PassOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            };
        };
        // checked after the guard so a pass either sees `disposed` or is
        // waited on by `dispose`
        if self.is_disposed() {
            debug!("queue: disposed, pass skipped");
            return PassOutcome::Skipped {
                reason: SkipReason::Disposed,
            };
        }
        if !self.inner.network.is_online() {
            debug!("queue: offline, pass skipped");
            return PassOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }
        self.restore().await;
        let snapshot = {
            let mut state = self.inner.lock_state();
            state.sort();
            state.to_vec()
        };
        if snapshot.is_empty() {
            return PassOutcome::Skipped {
                reason: SkipReason::Empty,
            };
        }

        let mut summary = PassSummary::default();
        let mut changes = Vec::new();
        for request in snapshot {
            if !self.inner.network.is_online() {
                info!(
                    kind = %FailureKind::NetworkUnavailable,
                    "queue: went offline, pass paused"
                );
                summary.aborted_offline = true;
                break;
            }
            if !request.is_due(self.inner.clock.now()) {
                summary.deferred += 1;
                continue;
            }

            if !self.inner.lock_state().contains(&request.id) {
                debug!(request_id = %request.id, "queue: removed mid-pass, not sent");
                summary.removed += 1;
                continue;
            }

            summary.attempted += 1;
            self.inner.listeners.sync(&request);
            let outcome = self.inner.executor.execute(&request).await;
            let change = self.settle(request, outcome, &mut summary);
            changes.push(change);
        }

        {
            let mut state = self.inner.lock_state();
            for (id, change) in changes {
                match change {
                    Change::Remove => {
                        state.remove(&id);
                    }
                    Change::Retry {
                        retry_count,
                        next_attempt_at,
                    } => {
                        if let Some(r) = state.get_mut(&id) {
                            r.retry_count = retry_count;
                            r.next_attempt_at = next_attempt_at;
                        }
                    }
                }
            }
        }
        self.persist().await;
        drop(guard);

        info!(
            attempted = summary.attempted,
            delivered = summary.delivered,
            retried = summary.retried,
            dropped = summary.dropped,
            deferred = summary.deferred,
            removed = summary.removed,
            aborted_offline = summary.aborted_offline,
            "queue: pass completed"
        );
        self.inner.listeners.pass_completed(&summary);
        PassOutcome::Completed { summary }
    }

    fn settle(
        &self,
        request: QueuedRequest,
        outcome: DeliveryOutcome,
        summary: &mut PassSummary,
    ) -> (RequestId, Change) {
        let id = request.id;
        match outcome {
            DeliveryOutcome::Success { status } => {
                debug!(
                    request_id = %id,
                    endpoint = %request.endpoint,
                    status,
                    "queue: delivered"
                );
                summary.delivered += 1;
                self.inner.listeners.success(&request);
                (id, Change::Remove)
            }
            DeliveryOutcome::Retryable { status, reason } => {
                let retry_count = request.retry_count + 1;
                if retry_count >= request.max_retries {
                    warn!(
                        request_id = %id,
                        endpoint = %request.endpoint,
                        status = ?status,
                        retry_count,
                        %reason,
                        "queue: retries exhausted, dropping"
                    );
                    summary.dropped += 1;
                    let error = DeliveryError::retries_exhausted(status, &reason, retry_count);
                    let exhausted = QueuedRequest {
                        retry_count,
                        next_attempt_at: None,
                        ..request
                    };
                    self.inner.listeners.error(&exhausted, &error);
                    (id, Change::Remove)
                } else {
                    let next_attempt_at = self
                        .inner
                        .retry
                        .next_attempt_at(self.inner.clock.now(), retry_count);
                    debug!(
                        request_id = %id,
                        endpoint = %request.endpoint,
                        status = ?status,
                        retry_count,
                        next_attempt_at = ?next_attempt_at,
                        %reason,
                        "queue: retryable failure, keeping"
                    );
                    summary.retried += 1;
                    (
                        id,
                        Change::Retry {
                            retry_count,
                            next_attempt_at,
                        },
                    )
                }
            }
            DeliveryOutcome::Terminal { status, reason } => {
                warn!(
                    request_id = %id,
                    endpoint = %request.endpoint,
                    status = ?status,
                    %reason,
                    "queue: terminal failure, dropping"
                );
                summary.dropped += 1;
                self.inner
                    .listeners
                    .error(&request, &DeliveryError::terminal(status, reason));
                (id, Change::Remove)
            }
        }
    }

    fn report_evicted(&self, evicted: &[QueuedRequest]) {
        let max = self.inner.config.max_queue_size;
        for request in evicted {
            warn!(
                request_id = %request.id,
                endpoint = %request.endpoint,
                priority = %request.priority,
                kind = %FailureKind::Evicted,
                max_queue_size = max,
                "queue: evicted to stay within max_queue_size"
            );
            self.inner
                .listeners
                .error(request, &DeliveryError::evicted(max));
        }
    }

    /// Snapshot and save. Failures are logged; the queue keeps running in memory.
    async fn persist(&self) {
        let _write = self.inner.persist_lock.lock().await;
        let snapshot = self.inner.lock_state().to_vec();
        if let Err(e) = self.inner.store.save(&snapshot).await {
            warn!(
                key = self.inner.store.key(),
                kind = %FailureKind::StorageFailure,
                error = %e,
                "queue: failed to persist snapshot; continuing in memory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::QueueManagerBuilder;
    use crate::domain::{HttpMethod, Priority};
    use crate::impls::scripted::ScriptedTransport;
    use crate::impls::{InMemoryStorage, ManualProbe};
    use crate::ports::{FixedClock, KeyValueStorage, StorageError, TransportError};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const KEY: &str = "offline_queue";

    struct Harness {
        manager: QueueManager,
        probe: ManualProbe,
        transport: Arc<ScriptedTransport>,
        storage: InMemoryStorage,
        clock: Arc<FixedClock>,
        syncs: Arc<AtomicUsize>,
        errors: Arc<Mutex<Vec<(RequestId, DeliveryError)>>>,
        successes: Arc<AtomicUsize>,
    }

    fn config() -> QueueConfig {
        QueueConfig {
            base_url: Some("https://api.test".into()),
            ..QueueConfig::default()
        }
    }

    fn harness_with(
        config: QueueConfig,
        transport: ScriptedTransport,
        storage: InMemoryStorage,
    ) -> Harness {
        let probe = ManualProbe::new(false);
        let transport = Arc::new(transport);
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let syncs = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let (s, ok, e) = (syncs.clone(), successes.clone(), errors.clone());
        let manager = QueueManagerBuilder::new()
            .config(config)
            .storage(Arc::new(storage.clone()))
            .transport(transport.clone())
            .probe(Arc::new(probe.clone()))
            .clock(clock.clone())
            .on_sync(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_| {
                ok.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |request, error| {
                e.lock().unwrap().push((request.id, error.clone()));
            })
            .build()
            .unwrap();

        Harness {
            manager,
            probe,
            transport,
            storage,
            clock,
            syncs,
            errors,
            successes,
        }
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        harness_with(config(), transport, InMemoryStorage::new())
    }

    impl Harness {
        /// Enqueue one second apart so enqueue order is visible in timestamps.
        async fn enqueue(&self, path: &str, priority: Priority) -> RequestId {
            self.clock.advance(ChronoDuration::seconds(1));
            self.manager
                .enqueue(RequestSpec::post(path).with_priority(priority))
                .await
                .unwrap()
        }

        fn errors(&self) -> Vec<(RequestId, DeliveryError)> {
            self.errors.lock().unwrap().clone()
        }

        async fn stored(&self) -> serde_json::Value {
            let bytes = self.storage.get(KEY).await.unwrap().unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }
    }

    async fn next_pass(rx: &mut broadcast::Receiver<QueueEvent>) -> PassSummary {
        let wait = async {
            loop {
                if let QueueEvent::PassCompleted { summary } = rx.recv().await.unwrap() {
                    return summary;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("pass did not complete")
    }

    async fn next_sync(rx: &mut broadcast::Receiver<QueueEvent>) -> QueuedRequest {
        let wait = async {
            loop {
                if let QueueEvent::Sync { request } = rx.recv().await.unwrap() {
                    return request;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("no attempt started")
    }

    fn completed(outcome: PassOutcome) -> PassSummary {
        match outcome.summary() {
            Some(summary) => summary.clone(),
            None => panic!("expected a completed pass, got {outcome:?}"),
        }
    }

    #[tokio::test]
    async fn reconnect_processes_in_priority_order() {
        let h = harness(ScriptedTransport::always(200));
        h.manager.init().await;
        let mut rx = h.manager.subscribe();

        h.enqueue("/low", Priority::Low).await;
        h.enqueue("/high", Priority::High).await;
        h.enqueue("/normal", Priority::Normal).await;
        assert!(h.transport.calls().is_empty());

        h.probe.set_online(true);
        assert!(h.manager.check_connectivity().await);
        let summary = next_pass(&mut rx).await;

        assert_eq!(summary.delivered, 3);
        assert_eq!(
            h.transport.urls(),
            vec![
                "https://api.test/high",
                "https://api.test/normal",
                "https://api.test/low",
            ]
        );
        assert!(h.manager.get_queue().is_empty());
        assert_eq!(h.successes.load(Ordering::SeqCst), 3);
        assert_eq!(h.stored().await["requests"].as_array().unwrap().len(), 0);
        h.manager.dispose().await;
    }

    #[tokio::test]
    async fn fifo_within_a_priority_tier() {
        let h = harness(ScriptedTransport::always(204));
        let mut rx = h.manager.subscribe();
        for path in ["/a", "/b", "/c"] {
            h.enqueue(path, Priority::Normal).await;
        }
        h.enqueue("/urgent", Priority::High).await;

        h.probe.set_online(true);
        h.manager.check_connectivity().await;
        next_pass(&mut rx).await;

        assert_eq!(
            h.transport.urls(),
            vec![
                "https://api.test/urgent",
                "https://api.test/a",
                "https://api.test/b",
                "https://api.test/c",
            ]
        );
    }

    #[tokio::test]
    async fn admission_control_keeps_queue_bounded() {
        let h = harness_with(
            QueueConfig {
                max_queue_size: 2,
                ..config()
            },
            ScriptedTransport::always(200),
            InMemoryStorage::new(),
        );
        h.manager.init().await;

        let low = h.enqueue("/low", Priority::Low).await;
        let normal = h.enqueue("/normal", Priority::Normal).await;
        let high = h.enqueue("/high", Priority::High).await;

        let queue: Vec<RequestId> = h.manager.get_queue().iter().map(|r| r.id).collect();
        assert_eq!(queue, vec![high, normal]);
        assert_eq!(h.manager.get_queue_status().size, 2);

        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, low);
        assert_eq!(errors[0].1.kind, FailureKind::Evicted);
    }

    #[tokio::test]
    async fn eviction_falls_back_to_oldest_without_low() {
        let h = harness_with(
            QueueConfig {
                max_queue_size: 2,
                ..config()
            },
            ScriptedTransport::always(200),
            InMemoryStorage::new(),
        );
        let first = h.enqueue("/n1", Priority::Normal).await;
        let second = h.enqueue("/h1", Priority::High).await;
        let third = h.enqueue("/n2", Priority::Normal).await;

        let queue: Vec<RequestId> = h.manager.get_queue().iter().map(|r| r.id).collect();
        assert_eq!(queue, vec![second, third]);
        assert_eq!(h.errors()[0].0, first);
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries_after_max_passes() {
        let h = harness(ScriptedTransport::always(500));
        h.manager.init().await;
        let mut rx = h.manager.subscribe();
        let id = h.enqueue("/flaky", Priority::Normal).await;

        h.probe.set_online(true);
        h.manager.check_connectivity().await;
        let first = next_pass(&mut rx).await;
        assert_eq!(first.retried, 1);
        assert_eq!(h.manager.get_queue()[0].retry_count, 1);

        let second = completed(h.manager.process_queue().await);
        assert_eq!(second.retried, 1);
        assert_eq!(h.manager.get_queue()[0].retry_count, 2);
        assert!(h.errors().is_empty());

        let third = completed(h.manager.process_queue().await);
        assert_eq!(third.dropped, 1);
        assert!(h.manager.get_queue().is_empty());

        assert_eq!(h.syncs.load(Ordering::SeqCst), 3);
        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, id);
        assert_eq!(errors[0].1.kind, FailureKind::RetriesExhausted);
        assert_eq!(errors[0].1.status, Some(500));
    }

    #[tokio::test]
    async fn client_errors_are_dropped_immediately() {
        let h = harness(ScriptedTransport::always(200).then(Ok(404)));
        let mut rx = h.manager.subscribe();
        h.enqueue("/missing", Priority::High).await;
        h.enqueue("/fine", Priority::Normal).await;

        h.probe.set_online(true);
        h.manager.check_connectivity().await;
        let summary = next_pass(&mut rx).await;

        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.delivered, 1);
        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1.kind, FailureKind::Terminal);
        assert_eq!(errors[0].1.status, Some(404));
    }

    #[tokio::test]
    async fn corrupted_snapshot_starts_empty() {
        let storage = InMemoryStorage::new();
        storage.set(KEY, b"\x00\x01garbage".to_vec()).await.unwrap();
        let h = harness_with(config(), ScriptedTransport::always(200), storage);

        h.manager.init().await;
        assert!(h.manager.get_queue().is_empty());
        assert!(h.errors().is_empty());
    }

    #[tokio::test]
    async fn queue_survives_restart() {
        let storage = InMemoryStorage::new();
        let ids = {
            let h = harness_with(config(), ScriptedTransport::always(200), storage.clone());
            h.manager.init().await;
            let a = h.enqueue("/a", Priority::Low).await;
            let b = h.enqueue("/b", Priority::High).await;
            h.manager.dispose().await;
            vec![b, a]
        };

        let h = harness_with(config(), ScriptedTransport::always(200), storage);
        h.manager.init().await;
        let restored: Vec<RequestId> = h.manager.get_queue().iter().map(|r| r.id).collect();
        assert_eq!(restored, ids);
    }

    #[tokio::test]
    async fn process_queue_skips_when_offline_or_empty() {
        let h = harness(ScriptedTransport::always(200));
        h.manager.init().await;
        h.enqueue("/x", Priority::Normal).await;
        assert_eq!(
            h.manager.process_queue().await,
            PassOutcome::Skipped {
                reason: SkipReason::Offline
            }
        );

        h.manager.clear_queue().await;
        h.probe.set_online(true);
        h.manager.check_connectivity().await;
        assert_eq!(
            h.manager.process_queue().await,
            PassOutcome::Skipped {
                reason: SkipReason::Empty
            }
        );
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrent_pass_is_a_no_op() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedTransport::always(200).gated(gate.clone()));
        h.enqueue("/slow", Priority::Normal).await;
        h.probe.set_online(true);

        let mut rx = h.manager.subscribe();
        // first pass blocks inside the transport until the gate opens
        h.manager.check_connectivity().await;
        next_sync(&mut rx).await;
        assert!(h.manager.is_processing());
        assert!(h.manager.get_queue_status().is_processing);

        assert_eq!(
            h.manager.process_queue().await,
            PassOutcome::Skipped {
                reason: SkipReason::AlreadyRunning
            }
        );

        gate.notify_one();
        let summary = next_pass(&mut rx).await;
        assert_eq!(summary.delivered, 1);
        assert_eq!(h.transport.calls().len(), 1);
        assert!(!h.manager.is_processing());
    }

    #[tokio::test]
    async fn requests_changed_mid_pass_are_respected() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedTransport::always(503).gated(gate.clone()));
        let first = h.enqueue("/first", Priority::High).await;
        let cancelled = h.enqueue("/cancelled", Priority::Low).await;
        h.probe.set_online(true);

        let mut rx = h.manager.subscribe();
        h.manager.check_connectivity().await;
        next_sync(&mut rx).await;

        let late = h.enqueue("/late", Priority::High).await;
        assert!(h.manager.dequeue(&cancelled).await);
        gate.notify_one();
        let summary = next_pass(&mut rx).await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(h.syncs.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.urls(), vec!["https://api.test/first".to_string()]);

        let queue = h.manager.get_queue();
        let ids: Vec<RequestId> = queue.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first));
        assert!(ids.contains(&late));
        let late_entry = queue.iter().find(|r| r.id == late).unwrap();
        assert_eq!(late_entry.retry_count, 0);
    }

    #[tokio::test]
    async fn request_evicted_mid_pass_is_not_sent() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            QueueConfig {
                max_queue_size: 2,
                ..config()
            },
            ScriptedTransport::always(200).gated(gate.clone()),
            InMemoryStorage::new(),
        );
        h.enqueue("/first", Priority::High).await;
        let victim = h.enqueue("/victim", Priority::Low).await;
        h.probe.set_online(true);

        let mut rx = h.manager.subscribe();
        h.manager.check_connectivity().await;
        next_sync(&mut rx).await;

        // admission pushes `victim` out while the pass still holds it
        h.enqueue("/third", Priority::Normal).await;
        gate.notify_one();
        let summary = next_pass(&mut rx).await;

        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(h.transport.urls(), vec!["https://api.test/first".to_string()]);
        assert_eq!(h.successes.load(Ordering::SeqCst), 1);

        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, victim);
        assert_eq!(errors[0].1.kind, FailureKind::Evicted);
    }

    #[tokio::test]
    async fn going_offline_mid_pass_leaves_the_rest() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedTransport::always(200).gated(gate.clone()));
        h.enqueue("/one", Priority::High).await;
        h.enqueue("/two", Priority::Normal).await;
        h.probe.set_online(true);

        let mut rx = h.manager.subscribe();
        h.manager.check_connectivity().await;
        next_sync(&mut rx).await;
        h.probe.set_online(false);
        h.manager.check_connectivity().await;
        gate.notify_one();

        let summary = next_pass(&mut rx).await;
        assert!(summary.aborted_offline);
        assert_eq!(summary.delivered, 1);
        let queue = h.manager.get_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].endpoint, "/two");
        assert_eq!(queue[0].retry_count, 0);
    }

    #[tokio::test]
    async fn backoff_defers_until_due() {
        let h = harness_with(
            QueueConfig {
                retry: crate::config::RetryConfig {
                    base_delay_ms: 10_000,
                    ..Default::default()
                },
                ..config()
            },
            ScriptedTransport::always(200).then(Ok(502)),
            InMemoryStorage::new(),
        );
        let mut rx = h.manager.subscribe();
        h.enqueue("/later", Priority::Normal).await;
        h.probe.set_online(true);
        h.manager.check_connectivity().await;
        assert_eq!(next_pass(&mut rx).await.retried, 1);

        let entry = &h.manager.get_queue()[0];
        assert_eq!(
            entry.next_attempt_at,
            Some(h.clock.now() + ChronoDuration::seconds(10))
        );

        let early = completed(h.manager.process_queue().await);
        assert_eq!(early.deferred, 1);
        assert_eq!(early.attempted, 0);

        h.clock.advance(ChronoDuration::seconds(10));
        let due = completed(h.manager.process_queue().await);
        assert_eq!(due.delivered, 1);
        assert!(h.manager.get_queue().is_empty());
    }

    #[tokio::test]
    async fn enqueue_rejects_invalid_spec_without_side_effects() {
        let h = harness(ScriptedTransport::always(200));
        let err = h
            .manager
            .enqueue(RequestSpec::new(HttpMethod::Get, "not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::InvalidRequest(_)));
        assert!(h.manager.get_queue().is_empty());
        assert!(h.storage.get(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dequeue_and_status() {
        let h = harness(ScriptedTransport::always(200));
        let a = h.enqueue("/a", Priority::Normal).await;
        let b = h.enqueue("/b", Priority::Normal).await;

        let status = h.manager.get_queue_status();
        assert_eq!(status.size, 2);
        assert!(!status.is_online);
        assert!(!status.is_processing);
        let oldest = h.manager.get_queue()[0].enqueued_at;
        assert_eq!(status.oldest_request_timestamp, Some(oldest));

        assert!(h.manager.dequeue(&a).await);
        assert!(!h.manager.dequeue(&a).await);
        let stored = h.stored().await;
        assert_eq!(stored["requests"][0]["id"], serde_json::json!(b.as_ulid().to_string()));

        assert_eq!(h.manager.clear_queue().await, 1);
        assert_eq!(h.manager.get_queue_status().oldest_request_timestamp, None);
    }

    #[tokio::test]
    async fn enqueue_before_init_keeps_stored_requests() {
        let storage = InMemoryStorage::new();
        let stored_id = {
            let h = harness_with(config(), ScriptedTransport::always(200), storage.clone());
            h.enqueue("/stored", Priority::Normal).await
        };

        let h = harness_with(config(), ScriptedTransport::always(200), storage);
        let early = h.enqueue("/early", Priority::Normal).await;
        h.manager.restore().await;

        let ids: Vec<RequestId> = h.manager.get_queue().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![stored_id, early]);
        assert_eq!(h.stored().await["requests"].as_array().unwrap().len(), 2);
        assert!(!h.manager.is_online());
    }

    #[tokio::test]
    async fn dispose_waits_for_running_pass() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedTransport::always(200).gated(gate.clone()));
        h.enqueue("/slow", Priority::Normal).await;
        h.probe.set_online(true);
        let mut rx = h.manager.subscribe();
        h.manager.check_connectivity().await;
        next_sync(&mut rx).await;

        let manager = h.manager.clone();
        let disposing = tokio::spawn(async move { manager.dispose().await });
        tokio::task::yield_now().await;
        assert!(!disposing.is_finished());

        gate.notify_one();
        disposing.await.unwrap();
        assert!(!h.manager.is_processing());
        assert!(h.manager.get_queue().is_empty());
        assert_eq!(h.stored().await["requests"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn no_passes_after_dispose() {
        let h = harness(ScriptedTransport::always(200));
        h.probe.set_online(true);
        h.manager.init().await;
        h.manager.dispose().await;

        h.enqueue("/too-late", Priority::Normal).await;
        h.manager.kick();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            h.manager.process_queue().await,
            PassOutcome::Skipped {
                reason: SkipReason::Disposed
            }
        );
        assert!(h.transport.calls().is_empty());
        assert_eq!(h.syncs.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.get_queue().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_timer_tick_runs_a_pass() {
        let h = harness_with(
            QueueConfig {
                sync_interval_ms: 30_000,
                network_poll_interval_ms: 3_600_000,
                ..config()
            },
            ScriptedTransport::always(503),
            InMemoryStorage::new(),
        );
        h.enqueue("/pending", Priority::Normal).await;
        let mut rx = h.manager.subscribe();

        // the offline → online transition in init runs the first pass
        h.probe.set_online(true);
        h.manager.init().await;
        assert_eq!(next_pass(&mut rx).await.retried, 1);
        assert_eq!(h.transport.calls().len(), 1);

        tokio::time::advance(Duration::from_millis(30_000)).await;
        let summary = next_pass(&mut rx).await;
        assert_eq!(summary.attempted, 1);
        assert_eq!(h.transport.calls().len(), 2);
        assert_eq!(h.manager.get_queue()[0].retry_count, 2);

        h.manager.dispose().await;
    }

    #[tokio::test]
    async fn init_and_dispose_are_idempotent() {
        let h = harness(ScriptedTransport::always(200));
        h.manager.init().await;
        h.manager.init().await;
        h.manager.dispose().await;
        h.manager.dispose().await;
        assert!(h.manager.get_queue().is_empty());
    }

    struct FailingStorage;

    #[async_trait]
    impl KeyValueStorage for FailingStorage {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_failures_do_not_break_the_queue() {
        let probe = ManualProbe::new(true);
        let transport = Arc::new(ScriptedTransport::always(200));
        let manager = QueueManagerBuilder::new()
            .config(config())
            .storage(Arc::new(FailingStorage))
            .transport(transport.clone())
            .probe(Arc::new(probe))
            .build()
            .unwrap();
        let mut rx = manager.subscribe();

        manager.init().await;
        manager
            .enqueue(RequestSpec::post("/still-works"))
            .await
            .unwrap();
        let summary = next_pass(&mut rx).await;
        assert_eq!(summary.delivered, 1);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn transport_unreachable_counts_as_retryable() {
        let h = harness(
            ScriptedTransport::always(200).then(Err(TransportError::Unreachable("refused".into()))),
        );
        let mut rx = h.manager.subscribe();
        h.enqueue("/x", Priority::Normal).await;
        h.probe.set_online(true);
        h.manager.check_connectivity().await;

        let summary = next_pass(&mut rx).await;
        assert_eq!(summary.retried, 1);
        assert_eq!(h.manager.get_queue()[0].retry_count, 1);
        assert!(h.errors().is_empty());
    }
}
