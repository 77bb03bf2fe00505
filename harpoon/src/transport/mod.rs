//! Framed TCP channels with handler callbacks.
//!
//! The RPC core never touches raw sockets: it consumes [`Channel`] handles
//! that deliver whole messages and expose write/close/liveness, plus a
//! [`ChannelHandler`] notification surface (`on_active`, `on_message`,
//! `on_error`, `on_close`). This module provides the Tokio implementation
//! of that contract.
//!
//! # Framing
//!
//! Each message is a 4-byte little-endian length prefix followed by the
//! payload. Payloads over [`MAX_FRAME_SIZE`] are rejected on both the read
//! and write paths to bound memory use.
//!
//! # Tasks
//!
//! Every channel owns two background tasks:
//!
//! - a **writer** draining an unbounded queue into the socket, so
//!   [`Channel::write`] never blocks the caller on socket backpressure;
//! - a **reader** re-assembling frames and spawning one task per inbound
//!   message, so a slow handler cannot stall reception of unrelated
//!   messages on the same connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::error::TransportError;

/// Maximum payload size for one frame (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Callbacks for channel lifecycle and inbound messages.
///
/// One handler instance is typically shared by many channels (all pooled
/// client connections, or all accepted server connections), so state lives
/// behind the handler, not per channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    /// A channel finished connecting or was accepted.
    fn on_active(&self, channel: &Channel) {
        tracing::debug!(peer = %channel.peer_addr(), "channel active");
    }

    /// A whole message arrived. Invoked on its own task per message.
    async fn on_message(&self, channel: Channel, frame: Vec<u8>);

    /// The socket failed mid-stream. The channel is already inactive.
    fn on_error(&self, channel: &Channel, error: &TransportError) {
        tracing::warn!(peer = %channel.peer_addr(), %error, "channel error");
    }

    /// The peer closed the connection or the reader stopped.
    fn on_close(&self, channel: &Channel) {
        tracing::debug!(peer = %channel.peer_addr(), "channel closed");
    }
}

struct ChannelInner {
    peer: String,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    active: AtomicBool,
    close_tx: watch::Sender<bool>,
}

/// Handle over one live connection.
///
/// Cheap to clone; all clones share the same underlying socket and
/// liveness flag. Between [`ChannelPool::acquire`] and
/// [`ChannelPool::release`] a channel is exclusively held by one caller,
/// but the handle itself makes no such guarantee.
///
/// [`ChannelPool::acquire`]: crate::client::pool::ChannelPool::acquire
/// [`ChannelPool::release`]: crate::client::pool::ChannelPool::release
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer", &self.inner.peer)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Channel {
    /// Queue one frame for transmission.
    ///
    /// Hands the payload to the writer task and returns immediately; socket
    /// errors surface through [`ChannelHandler::on_error`] and deactivate
    /// the channel. Fails fast if the channel is already inactive or the
    /// payload exceeds [`MAX_FRAME_SIZE`].
    pub fn write(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        if !self.is_active() {
            return Err(TransportError::ConnectionClosed);
        }
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Whether the connection is still usable.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> &str {
        &self.inner.peer
    }

    /// Deactivate the channel and tear down its reader and writer tasks.
    pub fn close(&self) {
        self.deactivate();
        let _ = self.inner.close_tx.send(true);
    }

    fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
    }
}

/// Connect to a remote address and start the channel's reader and writer
/// tasks.
///
/// Connection-establishment failure surfaces as
/// [`TransportError::Connect`]; there is no internal retry.
pub async fn connect(
    addr: &str,
    handler: Arc<dyn ChannelHandler>,
) -> Result<Channel, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    Ok(spawn_channel(stream, handler))
}

/// Listening endpoint producing served [`Channel`]s.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to the given address (`"127.0.0.1:0"` picks an ephemeral port).
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(addr).await?,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept one inbound connection and start its channel tasks.
    pub async fn accept(&self, handler: Arc<dyn ChannelHandler>) -> std::io::Result<Channel> {
        let (stream, _) = self.inner.accept().await?;
        Ok(spawn_channel(stream, handler))
    }
}

/// Wrap an established stream into a [`Channel`] with reader/writer tasks.
pub fn spawn_channel(stream: TcpStream, handler: Arc<dyn ChannelHandler>) -> Channel {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    // Frames are small and latency-sensitive.
    if let Err(error) = stream.set_nodelay(true) {
        tracing::debug!(%error, "set_nodelay failed");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = watch::channel(false);

    let channel = Channel {
        inner: Arc::new(ChannelInner {
            peer,
            outbound: outbound_tx,
            active: AtomicBool::new(true),
            close_tx,
        }),
    };

    handler.on_active(&channel);

    tokio::spawn(writer_loop(
        write_half,
        outbound_rx,
        close_rx.clone(),
        channel.clone(),
        Arc::clone(&handler),
    ));
    tokio::spawn(reader_loop(read_half, close_rx, channel.clone(), handler));

    channel
}

async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut close_rx: watch::Receiver<bool>,
    channel: Channel,
    handler: Arc<dyn ChannelHandler>,
) {
    loop {
        let frame = tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => frame,
                // All handles dropped.
                None => break,
            },
            _ = close_rx.changed() => break,
        };
        let len = (frame.len() as u32).to_le_bytes();
        let result = async {
            write_half.write_all(&len).await?;
            write_half.write_all(&frame).await?;
            write_half.flush().await
        }
        .await;
        if let Err(error) = result {
            channel.deactivate();
            handler.on_error(&channel, &TransportError::Io(error));
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn reader_loop(
    mut read_half: OwnedReadHalf,
    mut close_rx: watch::Receiver<bool>,
    channel: Channel,
    handler: Arc<dyn ChannelHandler>,
) {
    loop {
        match read_frame(&mut read_half, &mut close_rx).await {
            Ok(Some(frame)) => {
                // One task per message: a slow handler must not block
                // reception of unrelated messages.
                let handler = Arc::clone(&handler);
                let channel = channel.clone();
                tokio::spawn(async move { handler.on_message(channel, frame).await });
            }
            Ok(None) => {
                channel.deactivate();
                break;
            }
            Err(error) => {
                channel.deactivate();
                handler.on_error(&channel, &error);
                break;
            }
        }
    }
    handler.on_close(&channel);
}

/// Read one length-prefixed frame. `Ok(None)` means orderly shutdown (peer
/// EOF or local close).
async fn read_frame(
    read_half: &mut OwnedReadHalf,
    close_rx: &mut watch::Receiver<bool>,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len_buf = [0u8; 4];
    let read = tokio::select! {
        read = read_half.read_exact(&mut len_buf) => read,
        _ = close_rx.changed() => return Ok(None),
    };
    match read {
        Ok(_) => {}
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(TransportError::Io(error)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = vec![0u8; len];
    let read = tokio::select! {
        read = read_half.read_exact(&mut frame) => read,
        _ = close_rx.changed() => return Ok(None),
    };
    match read {
        Ok(_) => Ok(Some(frame)),
        Err(error) => Err(TransportError::Io(error)),
    }
}
