//! ConnectivityProbe port - プラットフォームの接続状態 API の抽象化
//!
//! NetworkMonitor が一定間隔で呼び出します。

use async_trait::async_trait;

/// ConnectivityProbe は「いまネットワークに出られるか」を答える
///
/// 失敗は `false` として扱います（エラー型は持たない）。
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}
