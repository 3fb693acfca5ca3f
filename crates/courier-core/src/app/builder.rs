//! QueueManagerBuilder - QueueManager の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に QueueConfig を検証し、不正なら BuildError を返す
//! - 省略された依存はデフォルト実装で埋める
//!
//! # デフォルト
//! - storage: InMemoryStorage
//! - transport: UreqTransport
//! - probe: `probe_addr` があれば TcpProbe、なければ常にオンラインの ManualProbe
//! - clock: SystemClock / id_generator: UlidGenerator

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::executor::RequestExecutor;
use super::listeners::{ErrorCallback, Listeners, RequestCallback};
use super::manager::{Inner, QueueManager, pass_trigger};
use super::network::NetworkMonitor;
use super::retry::RetryPolicy;
use super::scheduler::SyncTimer;
use super::store::QueueStore;
use crate::config::{ConfigError, QueueConfig};
use crate::domain::{DeliveryError, QueueState, QueuedRequest};
use crate::impls::{InMemoryStorage, UreqTransport, default_probe};
use crate::ports::{
    Clock, ConnectivityProbe, HttpTransport, IdGenerator, KeyValueStorage, SystemClock,
    UlidGenerator,
};

/// QueueManagerBuilder は QueueManager を構築
///
/// # 使用例
/// ```ignore
/// let manager = QueueManagerBuilder::new()
///     .config(QueueConfig::load(path)?)
///     .storage(Arc::new(FileStorage::open(dir).await?))
///     .on_error(|request, error| eprintln!("{} dropped: {error}", request.id))
///     .build()?;
/// manager.init().await;
/// ```
pub struct QueueManagerBuilder {
    config: QueueConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    transport: Option<Arc<dyn HttpTransport>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    on_sync: Vec<RequestCallback>,
    on_success: Vec<RequestCallback>,
    on_error: Vec<ErrorCallback>,
}

/// BuildError は QueueManager 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl QueueManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            storage: None,
            transport: None,
            probe: None,
            clock: None,
            id_generator: None,
            on_sync: Vec::new(),
            on_success: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Called when an attempt starts.
    pub fn on_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueuedRequest) + Send + Sync + 'static,
    {
        self.on_sync.push(Box::new(f));
        self
    }

    /// Called after a request was delivered and removed.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueuedRequest) + Send + Sync + 'static,
    {
        self.on_success.push(Box::new(f));
        self
    }

    /// Called when a request leaves the queue undelivered.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueuedRequest, &DeliveryError) + Send + Sync + 'static,
    {
        self.on_error.push(Box::new(f));
        self
    }

    /// Validate the configuration and wire everything together.
    ///
    /// Spawns nothing; background loops start in [`QueueManager::init`].
    pub fn build(self) -> Result<QueueManager, BuildError> {
        self.config.validate()?;

        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new(config.request_timeout())));
        let probe = self.probe.unwrap_or_else(|| default_probe(&config));
        let listeners = Listeners::new(self.on_sync, self.on_success, self.on_error);

        let inner = Arc::new_cyclic(|weak| {
            let trigger = pass_trigger(weak.clone());
            Inner {
                store: QueueStore::new(storage, config.storage_key.clone()),
                executor: RequestExecutor::new(
                    transport,
                    config.request_timeout(),
                    config.base_url.clone(),
                ),
                retry: RetryPolicy::from_config(&config.retry),
                network: NetworkMonitor::new(
                    probe,
                    config.network_poll_interval(),
                    Arc::clone(&trigger),
                ),
                timer: SyncTimer::new(trigger),
                state: Mutex::new(QueueState::new()),
                persist_lock: tokio::sync::Mutex::new(()),
                clock,
                ids: id_generator,
                listeners,
                processing: AtomicBool::new(false),
                pass_done: Notify::new(),
                restored: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                config,
            }
        });
        Ok(QueueManager::from_inner(inner))
    }
}

impl Default for QueueManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
