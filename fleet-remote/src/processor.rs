use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::Codec;
use crate::connection::Connection;

/// Handles every decoded message of a connection, one at a time and in arrival order. The
/// receive loop waits for `process` before reading further, so a slow processor holds back its
/// peer. An error closes the connection.
#[async_trait]
pub trait Processor<C>: Send + Sync + 'static where C: Codec {
    async fn process(&self, connection: &Arc<Connection<C>>, message: C::Message) -> anyhow::Result<()>;
}
