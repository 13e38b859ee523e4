use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MembershipSettings;
use crate::heartbeat::{HeartbeatPublisher, LastPublish, PlayerCount};
use crate::machine::MachineRecord;
use crate::member_table::MembershipTable;
use crate::store::CoordinationStore;
use crate::watcher::MembershipWatcher;

/// The membership pipeline of one node: its heartbeat publisher (with the liveness watchdog)
/// and the watcher feeding the shared [`MembershipTable`]. Dropping it stops both loops.
#[derive(Debug)]
pub struct Membership {
    unique_id: String,
    table: Arc<MembershipTable>,
    last_publish: LastPublish,
    fatal: CancellationToken,
    publisher: JoinHandle<Duration>,
    watcher: JoinHandle<()>,
}

impl Membership {
    pub fn start(
        record: MachineRecord,
        store: Arc<dyn CoordinationStore>,
        players: Arc<dyn PlayerCount>,
        settings: MembershipSettings,
    ) -> Self {
        let unique_id = record.unique_id().to_string();
        let table = Arc::new(MembershipTable::new(settings.start_time()));
        let fatal = CancellationToken::new();
        let publisher = HeartbeatPublisher::new(record, store.clone(), players, settings.clone(), fatal.clone());
        let last_publish = publisher.last_publish();
        let watcher = MembershipWatcher::new(store, table.clone(), settings);
        info!("start membership of {}", unique_id);
        Self {
            unique_id,
            table,
            last_publish,
            fatal,
            publisher: tokio::spawn(publisher.run()),
            watcher: tokio::spawn(watcher.run()),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn table(&self) -> &Arc<MembershipTable> {
        &self.table
    }

    pub fn last_publish(&self) -> &LastPublish {
        &self.last_publish
    }

    /// Cancelled once the watchdog declares this node stale.
    pub fn fatal(&self) -> CancellationToken {
        self.fatal.clone()
    }

    pub async fn stale(&self) {
        self.fatal.cancelled().await
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.publisher.abort();
        self.watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::MembershipSettings;
    use crate::machine::MachineRecord;
    use crate::membership::Membership;
    use crate::store::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_nodes_see_each_other() {
        let store = Arc::new(MemoryStore::new());
        let start = |unique_id: &str, players: u64| {
            Membership::start(
                MachineRecord::new(unique_id, 1, None),
                store.clone(),
                Arc::new(move || players),
                MembershipSettings::default(),
            )
        };
        let a = start("a", 5);
        let b = start("b", 8);
        tokio::time::sleep(Duration::from_secs(11)).await;
        for node in [&a, &b] {
            assert_eq!(node.table().unique_ids(), vec!["a".to_string(), "b".to_string()]);
        }
        assert_eq!(a.table().get("b").map(|r| r.player_count), Some(8));
        drop(b);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(a.table().unique_ids(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_node_signals_fatal() {
        let store = Arc::new(MemoryStore::new());
        let membership = Membership::start(
            MachineRecord::new("a", 1, None),
            store.clone(),
            Arc::new(|| 0),
            MembershipSettings::default(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.set_available(false);
        tokio::time::timeout(Duration::from_secs(30), membership.stale()).await.unwrap();
        assert!(membership.last_publish().elapsed() >= Duration::from_secs(15));
    }
}
