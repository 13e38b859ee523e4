use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use fleet_cluster::member_table::MembershipTable;
use fleet_cluster::watcher::MembershipWatcher;
use fleet_core::ext::init_logger_with_filter;

use crate::common::{build_store, membership_settings, StoreKind};

mod common;

/// Reads the fleet once and prints where new players would be routed.
#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:2379")]
    etcd: String,
    #[arg(long, value_enum, default_value_t = StoreKind::Etcd)]
    store: StoreKind,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, default_value_t = 1)]
    times: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger_with_filter("fleet=info,select=info");
    let settings = membership_settings(args.config.as_ref())?;
    let store = build_store(args.store, &args.etcd, settings.store_timeout()).await?;
    // skip the warm-up so freshly created machines are weighted like everyone else
    let table = Arc::new(MembershipTable::new(std::time::Duration::ZERO));
    let watcher = MembershipWatcher::new(store, table.clone(), settings);
    let count = watcher.sync_once().await?;
    info!("fleet has {} machines", count);
    for record in table.snapshot().values() {
        info!("{}", record);
    }
    for _ in 0..args.times {
        match table.random_machine() {
            None => info!("no machine available"),
            Some(record) => info!("select {}", record),
        }
    }
    Ok(())
}
