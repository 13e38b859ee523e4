use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use fleet_remote::codec::{Packet, PacketCodec};
use fleet_remote::connection::Connection;
use fleet_remote::processor::Processor;

/// Writes every inbound packet straight back to its sender.
pub struct Echo;

#[async_trait]
impl Processor<PacketCodec> for Echo {
    async fn process(&self, connection: &Arc<Connection<PacketCodec>>, message: Packet) -> anyhow::Result<()> {
        debug!("{} echo {} bytes", connection.peer(), message.len());
        connection.send_message(message).await?;
        Ok(())
    }
}
