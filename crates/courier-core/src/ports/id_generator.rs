//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（時刻 + ランダム部分）

use crate::domain::RequestId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はキュー内で一意な RequestId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（バックグラウンドのパスからも使う）
pub trait IdGenerator: Send + Sync {
    fn generate_request_id(&self) -> RequestId;
}

/// UlidGenerator は Clock の時刻 + 乱数で ULID を作る
///
/// FixedClock を渡すと timestamp 部分が固定されます（ランダム部分は残る）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_request_id(&self) -> RequestId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        RequestId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
