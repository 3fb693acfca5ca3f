//! App - アプリケーション層
//!
//! ports を組み合わせてオフラインキューを実装します。
//!
//! # 主要コンポーネント
//! - **QueueManagerBuilder**: 構築とワイヤリング
//! - **QueueManager**: 受付制御・処理パス・コールバック
//! - **QueueStore**: スナップショットの保存と復元
//! - **RequestExecutor**: 1 回の HTTP 試行と分類
//! - **NetworkMonitor**: 接続状態の追跡
//! - **SyncTimer**: 定期的なパス起動

pub mod builder;
pub mod executor;
pub mod listeners;
pub mod manager;
pub mod network;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod store;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, QueueManagerBuilder};
pub use self::executor::RequestExecutor;
pub use self::listeners::{ErrorCallback, RequestCallback};
pub use self::manager::QueueManager;
pub use self::network::NetworkMonitor;
pub use self::retry::RetryPolicy;
pub use self::scheduler::{PassTrigger, SyncTimer};
pub use self::status::{PassOutcome, PassSummary, QueueStatus, SkipReason};
pub use self::store::QueueStore;
