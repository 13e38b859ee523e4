use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::MembershipSettings;
use crate::error::{MembershipError, StoreError};
use crate::machine::MachineRecord;
use crate::member_table::MembershipTable;
use crate::store::CoordinationStore;

/// Pulls every published record on a fixed period and reconciles the table against it.
///
/// A node drops out of the table only when a read no longer returns it; there is no local
/// expiry. A node that stops publishing therefore lingers for its lease plus up to one more
/// period (around `2 x sync_member_time` past its last refresh window).
pub struct MembershipWatcher {
    store: Arc<dyn CoordinationStore>,
    table: Arc<MembershipTable>,
    settings: MembershipSettings,
}

impl MembershipWatcher {
    pub fn new(store: Arc<dyn CoordinationStore>, table: Arc<MembershipTable>, settings: MembershipSettings) -> Self {
        Self {
            store,
            table,
            settings,
        }
    }

    /// One read-and-reconcile pass, returns the number of records now in the table. On a read
    /// failure the table is left untouched.
    pub async fn sync_once(&self) -> Result<usize, MembershipError> {
        let read = self.store.read(&self.settings.machine_path, true);
        let nodes = tokio::time::timeout(self.settings.store_timeout(), read)
            .await
            .map_err(|_| StoreError::Timeout)??;
        let mut records = Vec::with_capacity(nodes.len());
        for node in nodes {
            match MachineRecord::decode(&node.value) {
                Ok(record) => {
                    records.push(record);
                }
                Err(error) => {
                    warn!("skip undecodable machine record {} {:?}", node.key, error);
                }
            }
        }
        self.table.reconcile(records);
        Ok(self.table.len())
    }

    pub async fn run(self) {
        let period = self.settings.sync_member_time();
        loop {
            match self.sync_once().await {
                Ok(members) => {
                    debug!("sync membership, {} members", members);
                }
                Err(error) if error.is_transient() => {
                    warn!("sync membership from {} error {:?}", self.settings.machine_path, error);
                }
                Err(error) => {
                    error!("sync membership from {} error {:?}", self.settings.machine_path, error);
                }
            }
            tokio::time::sleep(period).await;
        }
    }
}
