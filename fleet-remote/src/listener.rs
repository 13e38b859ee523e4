use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::RemoteSettings;
use crate::connection::Connection;
use crate::processor::Processor;

/// Accepts inbound TCP connections and drives each through a [`Connection`], keeping the live
/// ones in a registry keyed by peer address.
pub struct ConnectionListener<C> where C: Codec + Clone {
    listener: TcpListener,
    addr: SocketAddr,
    codec: C,
    processor: Arc<dyn Processor<C>>,
    settings: RemoteSettings,
    connections: Arc<DashMap<SocketAddr, Arc<Connection<C>>>>,
}

impl<C> ConnectionListener<C> where C: Codec + Clone {
    pub async fn bind<A>(
        addr: A,
        codec: C,
        processor: Arc<dyn Processor<C>>,
        settings: RemoteSettings,
    ) -> anyhow::Result<Self> where A: ToSocketAddrs {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!("start bind tcp addr {}", addr);
        let listener = Self {
            listener,
            addr,
            codec,
            processor,
            settings,
            connections: Arc::new(DashMap::new()),
        };
        Ok(listener)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn get(&self, peer: &SocketAddr) -> Option<Arc<Connection<C>>> {
        self.connections.get(peer).map(|c| c.value().clone())
    }

    /// Accept loop. Never returns; accept errors are logged and the loop keeps going.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(error) = stream.set_nodelay(true) {
                        warn!("{} set nodelay error {:?}", peer, error);
                    }
                    self.accept_inbound_connection(stream, peer);
                }
                Err(error) => {
                    warn!("{} accept connection error {:?}", self.addr, error);
                }
            }
        }
    }

    fn accept_inbound_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let connection = Connection::new(stream, peer, self.codec.clone(), self.settings.clone());
        self.connections.insert(peer, connection.clone());
        let connections = self.connections.clone();
        let processor = self.processor.clone();
        debug!("accept connection {}", peer);
        tokio::spawn(async move {
            if let Err(error) = connection.run(processor).await {
                warn!("connection {} run error {:?}", peer, error);
            }
            connection.closed().await;
            connections.remove_if(&peer, |_, c| Arc::ptr_eq(c, &connection));
        });
    }

    /// Closes every registered connection, waiting for each to drain its outbound queue.
    pub async fn close_all(&self) {
        let connections = self.connections.iter().map(|c| c.value().clone()).collect::<Vec<_>>();
        join_all(connections.iter().map(|c| c.close())).await;
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    use crate::codec::{Packet, PacketCodec};
    use crate::config::RemoteSettings;
    use crate::connection::Connection;
    use crate::listener::ConnectionListener;
    use crate::processor::Processor;

    struct Echo;

    #[async_trait]
    impl Processor<PacketCodec> for Echo {
        async fn process(&self, connection: &Arc<Connection<PacketCodec>>, message: Packet) -> anyhow::Result<()> {
            connection.send_message(message).await?;
            Ok(())
        }
    }

    async fn wait_for_count(listener: &ConnectionListener<PacketCodec>, count: usize) {
        while listener.connection_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_echo_and_close_all() -> anyhow::Result<()> {
        let listener = Arc::new(
            ConnectionListener::bind("127.0.0.1:0", PacketCodec::default(), Arc::new(Echo), RemoteSettings::default()).await?
        );
        let addr = listener.local_addr();
        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run().await })
        };
        let stream = TcpStream::connect(addr).await?;
        let local = stream.local_addr()?;
        let mut client = Framed::new(stream, PacketCodec::default());
        client.send(Packet::new(b"ping".to_vec())).await?;
        let echo = tokio::time::timeout(Duration::from_secs(1), client.next()).await?;
        assert_eq!(echo.transpose()?, Some(Packet::new(b"ping".to_vec())));
        assert!(listener.get(&local).is_some());
        assert_eq!(listener.connection_count(), 1);
        listener.close_all().await;
        assert_eq!(listener.connection_count(), 0);
        let eof = tokio::time::timeout(Duration::from_secs(1), client.next()).await?;
        assert!(eof.is_none());
        accept.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_peer_disconnect_leaves_registry() -> anyhow::Result<()> {
        let listener = Arc::new(
            ConnectionListener::bind("127.0.0.1:0", PacketCodec::default(), Arc::new(Echo), RemoteSettings::default()).await?
        );
        let addr = listener.local_addr();
        let accept = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run().await })
        };
        let stream = TcpStream::connect(addr).await?;
        tokio::time::timeout(Duration::from_secs(1), wait_for_count(&listener, 1)).await?;
        drop(stream);
        tokio::time::timeout(Duration::from_secs(1), wait_for_count(&listener, 0)).await?;
        accept.abort();
        Ok(())
    }
}
