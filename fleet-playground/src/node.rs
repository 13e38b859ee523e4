use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use config::File;
use tracing::{error, info};

use fleet_cluster::machine::MachineRecord;
use fleet_cluster::membership::Membership;
use fleet_core::config::{ConfigBuilder, environment};
use fleet_core::ext::init_logger_with_filter;
use fleet_remote::codec::PacketCodec;
use fleet_remote::config::RemoteSettings;
use fleet_remote::listener::ConnectionListener;

use crate::common::{build_store, membership_settings, StoreKind};
use crate::echo::Echo;

mod common;
mod echo;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    server_id: i64,
    #[arg(short, long)]
    addr: SocketAddrV4,
    #[arg(short, long)]
    unique_id: Option<String>,
    #[arg(short, long, default_value = "127.0.0.1:2379")]
    etcd: String,
    #[arg(long, value_enum, default_value_t = StoreKind::Etcd)]
    store: StoreKind,
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn remote_settings(config: Option<&PathBuf>) -> anyhow::Result<RemoteSettings> {
    let mut builder = RemoteSettings::builder();
    if let Some(path) = config {
        builder = builder.add_source(File::from(path.as_path()))?;
    }
    builder.add_source(environment())?.build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger_with_filter("fleet=debug,node=info");
    let membership_settings = membership_settings(args.config.as_ref())?;
    let remote_settings = remote_settings(args.config.as_ref())?;
    let store = build_store(args.store, &args.etcd, membership_settings.store_timeout()).await?;
    let codec = PacketCodec::new(remote_settings.max_frame_length);
    let listener = Arc::new(ConnectionListener::bind(args.addr, codec, Arc::new(Echo), remote_settings).await?);
    let unique_id = args.unique_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let record = MachineRecord::new(unique_id, args.server_id, Some(listener.local_addr().to_string()));
    let players = {
        let listener = listener.clone();
        Arc::new(move || listener.connection_count() as u64)
    };
    let membership = Membership::start(record, store, players, membership_settings);
    let result = tokio::select! {
        _ = listener.run() => Ok(()),
        _ = membership.stale() => {
            error!("machine {} lost its membership, stop node", membership.unique_id());
            Err(anyhow!("membership of {} went stale", membership.unique_id()))
        }
        signal = tokio::signal::ctrl_c() => {
            info!("receive ctrl c, stop node");
            signal.map_err(Into::into)
        }
    };
    listener.close_all().await;
    result
}
