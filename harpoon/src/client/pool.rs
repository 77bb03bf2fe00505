//! Bounded pool of reusable channels to one remote address.
//!
//! Channels are created lazily through the factory (one remote address, one
//! shared handler) and recycled after use. Acquisition prefers an idle
//! channel, creates a new one while below capacity, and otherwise waits for
//! a peer to release. A channel that fails its liveness check is discarded
//! and its capacity slot freed, so transient connection loss cannot
//! permanently shrink the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::error::TransportError;
use crate::transport::{Channel, ChannelHandler, connect};

/// Bounded set of reusable [`Channel`]s to a single remote address.
///
/// Invariant: the number of live channels never exceeds `max_size`. A slot
/// is reserved before connecting and released again if the connect fails or
/// the channel is later found dead.
pub struct ChannelPool {
    addr: String,
    handler: Arc<dyn ChannelHandler>,
    max_size: usize,
    /// Live channels, held or idle. Always `<= max_size`.
    count: AtomicUsize,
    idle_tx: mpsc::Sender<Channel>,
    idle_rx: Mutex<mpsc::Receiver<Channel>>,
}

impl ChannelPool {
    /// Create an empty pool. No connection is made until the first
    /// [`acquire`](Self::acquire).
    ///
    /// `handler` is attached to every channel the pool creates; for an RPC
    /// client this is the response-delivery handler.
    pub fn new(addr: impl Into<String>, max_size: usize, handler: Arc<dyn ChannelHandler>) -> Self {
        let max_size = max_size.max(1);
        // Capacity equals max_size, so a hand-back of a live channel can
        // never find the queue full and release stays non-blocking.
        let (idle_tx, idle_rx) = mpsc::channel(max_size);
        Self {
            addr: addr.into(),
            handler,
            max_size,
            count: AtomicUsize::new(0),
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
        }
    }

    /// Take exclusive ownership of one live channel.
    ///
    /// Suspends only when the pool is at capacity with no idle channel.
    /// Connection-establishment failure surfaces immediately; there is no
    /// retry for it. Dead channels found on the way are discarded and
    /// acquisition continues.
    pub async fn acquire(&self) -> Result<Channel, TransportError> {
        loop {
            let channel = match self.try_idle() {
                Some(channel) => channel,
                None if self.try_reserve_slot() => match connect(&self.addr, self.handler.clone())
                    .await
                {
                    Ok(channel) => channel,
                    Err(error) => {
                        self.count.fetch_sub(1, Ordering::AcqRel);
                        return Err(error);
                    }
                },
                None => {
                    let mut idle_rx = self.idle_rx.lock().await;
                    idle_rx.recv().await.ok_or(TransportError::PoolClosed)?
                }
            };

            if channel.is_active() {
                return Ok(channel);
            }
            // Dead channel: free its slot and try again.
            tracing::debug!(peer = %channel.peer_addr(), "discarding dead pooled channel");
            channel.close();
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Hand a channel back to the idle set. Best-effort and non-blocking;
    /// never fails from the caller's perspective.
    pub fn release(&self, channel: Channel) {
        if let Err(error) = self.idle_tx.try_send(channel) {
            // Only reachable if the capacity invariant is broken or the
            // pool is gone; drop the channel and free its slot.
            tracing::warn!(%error, "channel hand-back failed, dropping channel");
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Number of live channels (held or idle).
    pub fn live_channels(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn try_idle(&self) -> Option<Channel> {
        // If another acquirer holds the receiver it is already waiting for
        // an idle channel; fall through to create-or-wait.
        let mut idle_rx = self.idle_rx.try_lock().ok()?;
        idle_rx.try_recv().ok()
    }

    /// Reserve a capacity slot if the pool is below `max_size`.
    fn try_reserve_slot(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max_size).then_some(count + 1)
            })
            .is_ok()
    }
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("addr", &self.addr)
            .field("max_size", &self.max_size)
            .field("live", &self.live_channels())
            .finish()
    }
}
