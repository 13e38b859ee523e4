use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MembershipSettings;
use crate::error::{MembershipError, StoreError};
use crate::machine::MachineRecord;
use crate::store::CoordinationStore;
use crate::watchdog::LivenessWatchdog;

/// Source of the load figure published with every heartbeat.
pub trait PlayerCount: Send + Sync + 'static {
    fn count(&self) -> u64;
}

impl<F> PlayerCount for F where F: Fn() -> u64 + Send + Sync + 'static {
    fn count(&self) -> u64 {
        self()
    }
}

/// Time of the last successful publish, written by the publisher and read by the watchdog.
#[derive(Debug, Clone)]
pub struct LastPublish {
    origin: Instant,
    offset_millis: Arc<AtomicU64>,
}

impl LastPublish {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark(&self) {
        let offset = self.origin.elapsed().as_millis() as u64;
        self.offset_millis.store(offset, Ordering::Release);
    }

    /// How long ago the last successful publish happened.
    pub fn elapsed(&self) -> Duration {
        let offset = Duration::from_millis(self.offset_millis.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(offset)
    }
}

impl Default for LastPublish {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps this node's record alive in the store, republishing it with a fresh lease every
/// `sync_member_time`.
pub struct HeartbeatPublisher {
    record: MachineRecord,
    store: Arc<dyn CoordinationStore>,
    players: Arc<dyn PlayerCount>,
    settings: MembershipSettings,
    last_publish: LastPublish,
    fatal: CancellationToken,
}

impl HeartbeatPublisher {
    pub fn new(
        record: MachineRecord,
        store: Arc<dyn CoordinationStore>,
        players: Arc<dyn PlayerCount>,
        settings: MembershipSettings,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            record,
            store,
            players,
            settings,
            last_publish: LastPublish::new(),
            fatal,
        }
    }

    pub fn record(&self) -> &MachineRecord {
        &self.record
    }

    pub fn last_publish(&self) -> LastPublish {
        self.last_publish.clone()
    }

    pub async fn publish_once(&mut self) -> Result<(), MembershipError> {
        self.record.update_player_count(self.players.count());
        let key = self.settings.machine_key(self.record.unique_id());
        let value = self.record.encode()?;
        let write = self.store.write(&key, value, self.settings.member_ttl());
        tokio::time::timeout(self.settings.store_timeout(), write)
            .await
            .map_err(|_| StoreError::Timeout)??;
        self.last_publish.mark();
        Ok(())
    }

    /// Publishes until the watchdog declares this node stale, then returns how long the node
    /// went without a successful publish. Store failures never end the loop by themselves.
    pub async fn run(mut self) -> Duration {
        self.last_publish.mark();
        let watchdog = LivenessWatchdog::new(self.last_publish.clone(), &self.settings, self.fatal.clone());
        let watchdog = watchdog.run();
        tokio::pin!(watchdog);
        info!("start publish machine {}", self.record);
        loop {
            tokio::select! {
                stale = &mut watchdog => return stale,
                _ = self.cycle() => {}
            }
        }
    }

    async fn cycle(&mut self) {
        match self.publish_once().await {
            Ok(_) => {
                debug!("publish machine {} player_count {}", self.record.unique_id(), self.record.player_count);
            }
            Err(error) if error.is_transient() => {
                warn!("publish machine {} error {:?}", self.record.unique_id(), error);
            }
            Err(error) => {
                error!("publish machine {} error {:?}", self.record.unique_id(), error);
            }
        }
        tokio::time::sleep(self.settings.sync_member_time()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::config::MembershipSettings;
    use crate::heartbeat::{HeartbeatPublisher, LastPublish};
    use crate::machine::MachineRecord;
    use crate::member_table::MembershipTable;
    use crate::store::CoordinationStore;
    use crate::store::memory::MemoryStore;
    use crate::watcher::MembershipWatcher;

    fn publisher(store: Arc<MemoryStore>, players: Arc<AtomicU64>, fatal: CancellationToken) -> HeartbeatPublisher {
        let record = MachineRecord::new("node-1", 1, Some("127.0.0.1:2333".to_string()));
        HeartbeatPublisher::new(
            record,
            store,
            Arc::new(move || players.load(Ordering::Relaxed)),
            MembershipSettings::default(),
            fatal,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_publish_elapsed() {
        let last = LastPublish::new();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(last.elapsed(), Duration::from_secs(4));
        last.mark();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(last.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_once_writes_record() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let players = Arc::new(AtomicU64::new(12));
        let mut publisher = publisher(store.clone(), players, CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(3)).await;
        publisher.publish_once().await?;
        assert_eq!(publisher.last_publish().elapsed(), Duration::ZERO);
        let nodes = store.read("/machine/node-1", false).await?;
        assert_eq!(nodes.len(), 1);
        let record = MachineRecord::decode(&nodes[0].value)?;
        assert_eq!(record.player_count, 12);
        assert_eq!(&record, publisher.record());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_keeps_last_success() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let mut publisher = publisher(store, Arc::new(AtomicU64::new(0)), CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(publisher.publish_once().await.is_err());
        assert_eq!(publisher.last_publish().elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_watcher_sees_current_load() {
        let store = Arc::new(MemoryStore::new());
        let players = Arc::new(AtomicU64::new(10));
        let fatal = CancellationToken::new();
        let publisher = publisher(store.clone(), players.clone(), fatal.clone());
        let publish = tokio::spawn(publisher.run());
        let table = Arc::new(MembershipTable::new(Duration::from_secs(15)));
        let watcher = MembershipWatcher::new(store.clone(), table.clone(), MembershipSettings::default());
        let watch = tokio::spawn(watcher.run());
        tokio::time::sleep(Duration::from_secs(7)).await;
        players.store(33, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(table.get("node-1").map(|r| r.player_count), Some(33));
        assert!(!fatal.is_cancelled());
        publish.abort();
        watch.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_failure_is_fatal_once() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let fatal = CancellationToken::new();
        let publisher = publisher(store, Arc::new(AtomicU64::new(0)), fatal.clone());
        let publish = tokio::spawn(publisher.run());
        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(!fatal.is_cancelled());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fatal.is_cancelled());
        let stale = publish.await.unwrap();
        assert!(stale >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_store_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let fatal = CancellationToken::new();
        let publisher = publisher(store.clone(), Arc::new(AtomicU64::new(0)), fatal.clone());
        let publish = tokio::spawn(publisher.run());
        tokio::time::sleep(Duration::from_secs(4)).await;
        store.set_available(true);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!fatal.is_cancelled());
        assert!(!publish.is_finished());
        publish.abort();
    }
}
