use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::RemoteSettings;
use crate::error::ConnectionError;
use crate::processor::Processor;

pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxStream = Box<dyn AsyncStream>;

#[derive(Debug)]
enum Outbound {
    Frame(Bytes),
    Close,
}

struct Io {
    reader: ReadHalf<BoxStream>,
    writer: WriteHalf<BoxStream>,
    rx: Receiver<Outbound>,
}

/// One peer socket driven by two loops: the receive loop decodes and dispatches inbound
/// messages, the send loop drains the outbound queue onto the socket.
///
/// Frames leave in the order [`Connection::send_message`] queued them. [`Connection::close`]
/// lets the send loop finish everything queued before it, then releases the socket.
pub struct Connection<C> where C: Codec {
    peer: SocketAddr,
    codec: C,
    settings: RemoteSettings,
    tx: Sender<Outbound>,
    io: parking_lot::Mutex<Option<Io>>,
    // senders hold it shared while they check `stopped` and enqueue, `close` exclusively to stop
    gate: parking_lot::RwLock<()>,
    stopped: AtomicBool,
    send_loop: tokio::sync::Mutex<Option<JoinHandle<WriteHalf<BoxStream>>>>,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl<C> Connection<C> where C: Codec {
    pub fn new<S>(stream: S, peer: SocketAddr, codec: C, settings: RemoteSettings) -> Arc<Self> where S: AsyncStream {
        let stream: BoxStream = Box::new(stream);
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = channel(settings.outbound_capacity);
        let connection = Self {
            peer,
            codec,
            settings,
            tx,
            io: parking_lot::Mutex::new(Some(Io { reader, writer, rx })),
            gate: parking_lot::RwLock::new(()),
            stopped: AtomicBool::new(false),
            send_loop: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
        };
        Arc::new(connection)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// True once [`Connection::close`] has released the socket.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed, whoever closed it.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Starts the send loop and runs the receive loop until the peer goes away, a decode or
    /// process error occurs, or the connection is closed.
    pub async fn run(self: &Arc<Self>, processor: Arc<dyn Processor<C>>) -> Result<(), ConnectionError> {
        if self.is_stopped() {
            return Err(ConnectionError::Closed);
        }
        let Io { reader, writer, rx } = self.io.lock().take().ok_or(ConnectionError::AlreadyRunning)?;
        {
            let mut send_loop = self.send_loop.lock().await;
            if self.is_stopped() {
                return Err(ConnectionError::Closed);
            }
            let send = Self::send_loop(Arc::downgrade(self), self.peer, writer, rx);
            *send_loop = Some(tokio::spawn(send));
        }
        self.receive_loop(reader, processor).await;
        Ok(())
    }

    /// Encodes `message` and queues it behind every frame queued before. Waits while the
    /// outbound queue is full. `Ok` means the frame is queued ahead of any close, so it is
    /// written unless the drain on close times out.
    pub async fn send_message(&self, message: C::Message) -> Result<(), ConnectionError> {
        if self.is_stopped() {
            return Err(ConnectionError::Closed);
        }
        let frame = self.codec.encode(message, self).map_err(ConnectionError::Encode)?;
        let permit = self.tx.reserve().await.map_err(|_| ConnectionError::Closed)?;
        let _gate = self.gate.read();
        if self.is_stopped() {
            return Err(ConnectionError::Closed);
        }
        permit.send(Outbound::Frame(frame));
        Ok(())
    }

    /// Stops the connection. Frames queued before the call are still written, then the socket
    /// is shut down and released. A peer that stops reading gets `close_timeout` to drain,
    /// after which the send loop is aborted and the pending frames are dropped. Safe to call any
    /// number of times from any task; every call returns once the connection is closed.
    pub async fn close(&self) {
        {
            let _gate = self.gate.write();
            self.stopped.store(true, Ordering::Release);
        }
        let mut send_loop = self.send_loop.lock().await;
        if self.is_closed() {
            return;
        }
        if let Some(mut handle) = send_loop.take() {
            let drain = async {
                let _ = self.tx.send(Outbound::Close).await;
                (&mut handle).await
            };
            let drained = tokio::time::timeout(self.settings.close_timeout(), drain).await;
            match drained {
                Ok(Ok(mut writer)) => {
                    if let Err(error) = writer.shutdown().await {
                        debug!("connection {} shutdown error {:?}", self.peer, error);
                    }
                }
                Ok(Err(error)) => {
                    warn!("connection {} send loop failed {:?}", self.peer, error);
                }
                Err(_) => {
                    warn!("connection {} drain exceeds {:?}, drop pending frames", self.peer, self.settings.close_timeout());
                    handle.abort();
                }
            }
        }
        self.shutdown.cancel();
        self.io.lock().take();
        self.closed.cancel();
        info!("connection {} close", self.peer);
    }

    fn spawn_close(self: &Arc<Self>) {
        let connection = self.clone();
        tokio::spawn(async move {
            connection.close().await;
        });
    }

    async fn receive_loop(self: &Arc<Self>, mut reader: ReadHalf<BoxStream>, processor: Arc<dyn Processor<C>>) {
        let mut buffer = BytesMut::with_capacity(self.settings.read_chunk);
        let mut chunk = vec![0u8; self.settings.read_chunk];
        while !self.is_stopped() {
            match self.codec.decode(&mut buffer, self) {
                Ok(Some(message)) => {
                    if let Err(error) = processor.process(self, message).await {
                        warn!("connection {} process message error {:?}", self.peer, error);
                        break;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("connection {} decode message error {:?}", self.peer, error);
                    break;
                }
            }
            let read = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = reader.read(&mut chunk) => read,
            };
            match read {
                Ok(0) => {
                    debug!("connection {} closed by peer", self.peer);
                    break;
                }
                Ok(n) => {
                    // reserve reclaims the prefix already split off by decode
                    buffer.reserve(n);
                    buffer.extend_from_slice(&chunk[..n]);
                }
                Err(error) => {
                    warn!("connection {} recv message error {:?}", self.peer, error);
                    break;
                }
            }
        }
        self.spawn_close();
    }

    async fn send_loop(
        connection: Weak<Self>,
        peer: SocketAddr,
        mut writer: WriteHalf<BoxStream>,
        mut rx: Receiver<Outbound>,
    ) -> WriteHalf<BoxStream> {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Frame(frame) => frame,
                Outbound::Close => break,
            };
            let written = match writer.write_all(&frame).await {
                Ok(_) => writer.flush().await,
                Err(error) => Err(error),
            };
            if let Err(error) = written {
                warn!("connection {} send message error {:?}", peer, error);
                if let Some(connection) = connection.upgrade() {
                    connection.spawn_close();
                }
                break;
            }
        }
        writer
    }
}

impl<C> Debug for Connection<C> where C: Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("stopped", &self.is_stopped())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
