use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub mod etcd;
pub mod memory;

/// One live key under a directory read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoreNode {
    pub key: String,
    pub value: Vec<u8>,
}

/// The consistent key-value service membership is coordinated through. Implementations must
/// accept concurrent calls from the publisher and the watcher.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Writes `value` under `path`; the key disappears from reads once `ttl` elapses without
    /// another write.
    async fn write(&self, path: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Reads `path`, or with `recursive` every live key below the `path` directory.
    async fn read(&self, path: &str, recursive: bool) -> Result<Vec<StoreNode>, StoreError>;
}

pub(crate) fn check_path(path: &str) -> Result<(), StoreError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(StoreError::Rejected(format!("path {} is not absolute", path)))
    }
}

pub(crate) fn dir_prefix(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}
