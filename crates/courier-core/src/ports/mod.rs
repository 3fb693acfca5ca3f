//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ストレージ、HTTP、接続状態、時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod connectivity;
pub mod id_generator;
pub mod storage;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connectivity::ConnectivityProbe;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::storage::{KeyValueStorage, StorageError};
pub use self::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
