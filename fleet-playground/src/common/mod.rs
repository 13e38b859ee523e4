use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use config::File;

use fleet_cluster::config::MembershipSettings;
use fleet_cluster::store::CoordinationStore;
use fleet_cluster::store::etcd::EtcdStore;
use fleet_cluster::store::memory::MemoryStore;
use fleet_core::config::{ConfigBuilder, environment};
use fleet_core::ext::etcd_client::EtcdClient;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    Etcd,
    Memory,
}

pub async fn build_store(kind: StoreKind, etcd: &str, connect_timeout: Duration) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    let store: Arc<dyn CoordinationStore> = match kind {
        StoreKind::Etcd => {
            let client = EtcdClient::connect([etcd], connect_timeout).await?;
            Arc::new(EtcdStore::new(client))
        }
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

pub fn membership_settings(config: Option<&PathBuf>) -> anyhow::Result<MembershipSettings> {
    let mut builder = MembershipSettings::builder();
    if let Some(path) = config {
        builder = builder.add_source(File::from(path.as_path()))?;
    }
    builder.add_source(environment())?.build()
}
