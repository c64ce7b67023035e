#![forbid(unsafe_code)]

pub mod file;
pub mod http;
pub mod remote;
pub mod repository;
pub mod snapshot;

pub use file::FileKeyValue;
pub use http::HttpRemoteStore;
pub use remote::{InMemoryRemoteStore, RemoteError, RemoteProgressStore};
pub use repository::{InMemoryKeyValue, KeyValueStore, StorageError};
pub use snapshot::SnapshotStore;
