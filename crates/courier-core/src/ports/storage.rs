//! KeyValueStorage port - 永続化先の抽象化
//!
//! キューはスナップショット全体を 1 つのキーに書き込むだけなので、
//! 必要な能力は get / set / delete の 3 つだけです。
//!
//! # 実装
//! - **InMemoryStorage**: プロセス内（テスト・揮発でよい環境）
//! - **FileStorage**: ディレクトリ配下に 1 キー 1 ファイル

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key that the backend cannot represent.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Byte-oriented key/value capability.
///
/// # 設計原則
/// - `set` は上書き（部分更新はしない）
/// - 存在しないキーの `get` は `Ok(None)`、`delete` は `Ok(())`
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
