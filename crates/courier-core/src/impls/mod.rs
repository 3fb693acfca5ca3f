//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStorage** / **FileStorage**: KeyValueStorage
//! - **UreqTransport**: HttpTransport
//! - **TcpProbe** / **ManualProbe**: ConnectivityProbe

pub mod file_storage;
pub mod memory_storage;
pub mod probe;
pub mod ureq_transport;

#[cfg(test)]
pub(crate) mod scripted;

pub use self::file_storage::FileStorage;
pub use self::memory_storage::InMemoryStorage;
pub use self::probe::{ManualProbe, TcpProbe, default_probe};
pub use self::ureq_transport::UreqTransport;
