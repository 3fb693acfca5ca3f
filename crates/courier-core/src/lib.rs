//! courier-core
//!
//! Durable offline request queue: requests made while offline are persisted,
//! ordered by priority, and replayed when connectivity returns.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, request, queue_state, outcome, events）
//! - **ports**: 抽象化レイヤー（KeyValueStorage, HttpTransport, ConnectivityProbe, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, manager, store, executor, network, scheduler）
//! - **impls**: 実装（InMemoryStorage, FileStorage, UreqTransport, TcpProbe, ManualProbe）
//! - **config**: QueueConfig（TOML）
//! - **error**: 公開 API のエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{BuildError, PassOutcome, QueueManager, QueueManagerBuilder, QueueStatus};
pub use config::{ConfigError, QueueConfig};
pub use domain::{
    DeliveryError, FailureKind, HttpMethod, Priority, QueueEvent, QueuedRequest, RequestId,
    RequestSpec,
};
pub use error::CourierError;
