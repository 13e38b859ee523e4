use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::{check_path, CoordinationStore, dir_prefix, StoreNode};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    deadline: Instant,
}

/// Single-process store with lease expiry, used for local runs and tests. It can be switched
/// unavailable to simulate a partitioned store.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is switched off".to_string()))
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn write(&self, path: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        check_path(path)?;
        let entry = Entry {
            value,
            deadline: Instant::now() + ttl,
        };
        self.entries.lock().insert(path.to_string(), entry);
        Ok(())
    }

    async fn read(&self, path: &str, recursive: bool) -> Result<Vec<StoreNode>, StoreError> {
        self.check_available()?;
        check_path(path)?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.deadline > now);
        let nodes = if recursive {
            let prefix = dir_prefix(path);
            entries
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, entry)| StoreNode { key: key.clone(), value: entry.value.clone() })
                .collect()
        } else {
            entries
                .get(path)
                .map(|entry| StoreNode { key: path.to_string(), value: entry.value.clone() })
                .into_iter()
                .collect()
        };
        Ok(nodes)
    }
}
