//! InMemoryStorage - プロセス内の KeyValueStorage
//!
//! 再起動をまたいだ永続性はありません。テストと、揮発でよい環境向け。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{KeyValueStorage, StorageError};

/// HashMap ベースのストレージ
///
/// Clone すると同じ中身を共有します（テストで「再起動」を再現するのに使う）。
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
