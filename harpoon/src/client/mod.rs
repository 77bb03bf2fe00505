//! RPC client: pooled channels + request/response correlation.
//!
//! [`RpcClient::invoke`] gives synchronous-looking call semantics over an
//! asynchronous transport:
//!
//! 1. encode the arguments and build a [`RequestEnvelope`] with a fresh
//!    sequence number;
//! 2. register a response slot for that seq (before transmission, so a
//!    same-tick response always finds its waiter);
//! 3. acquire a pooled channel, write the frame, release the channel
//!    immediately — the channel is not held for the wait, so a small pool
//!    multiplexes many concurrent calls;
//! 4. await the slot up to the timeout.
//!
//! Responses arrive on an independent path: every pooled channel shares a
//! handler that decodes inbound [`ResponseEnvelope`]s and completes the
//! matching slot. A response whose seq has no pending entry (already timed
//! out, or spurious) is logged and dropped without disturbing other
//! in-flight calls.

pub mod correlation;
pub mod pool;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{BincodeCodec, Codec};
use crate::envelope::{RequestEnvelope, ResponseEnvelope, Status};
use crate::error::{RpcError, TransportError};
use crate::transport::{Channel, ChannelHandler};

use correlation::PendingCalls;
use pool::ChannelPool;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum number of pooled channels to the remote address.
    pub pool_size: usize,
    /// Default per-call timeout; overridable per call with
    /// [`RpcClient::invoke_with_timeout`].
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            call_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Start from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool capacity.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the default call timeout.
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Delivers inbound responses to their pending slots.
///
/// Shared by every channel the pool creates; runs on the per-message task
/// the transport spawns, independent of any `invoke` call.
struct ResponseHandler<C: Codec> {
    codec: C,
    pending: Arc<PendingCalls>,
}

#[async_trait]
impl<C: Codec> ChannelHandler for ResponseHandler<C> {
    async fn on_message(&self, channel: Channel, frame: Vec<u8>) {
        let response: ResponseEnvelope = match self.codec.decode(&frame) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(peer = %channel.peer_addr(), %error, "undecodable response frame dropped");
                return;
            }
        };
        let seq = response.seq;
        if !self.pending.complete(response) {
            // Already timed out, or a seq we never issued.
            tracing::warn!(seq, "dropping response with no pending call");
        }
    }
}

/// Client for invoking named methods on one remote service endpoint.
///
/// All state (pool, pending-call registry, sequence counter) is owned by
/// the instance, so multiple independent clients can coexist in one
/// process. The client is `Send + Sync`; share it behind an `Arc` and call
/// [`invoke`](Self::invoke) from arbitrarily many tasks concurrently.
pub struct RpcClient<C: Codec = BincodeCodec> {
    codec: C,
    pool: ChannelPool,
    pending: Arc<PendingCalls>,
    seq: AtomicI64,
    config: ClientConfig,
}

impl RpcClient<BincodeCodec> {
    /// Client with the default binary codec and default configuration.
    /// No connection is made until the first call.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_codec(addr, BincodeCodec, ClientConfig::default())
    }
}

impl<C: Codec> RpcClient<C> {
    /// Client with an explicit codec and configuration. The codec must
    /// match the server's.
    pub fn with_codec(addr: impl Into<String>, codec: C, config: ClientConfig) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let handler = Arc::new(ResponseHandler {
            codec: codec.clone(),
            pending: Arc::clone(&pending),
        });
        let pool = ChannelPool::new(addr, config.pool_size, handler);
        Self {
            codec,
            pool,
            pending,
            seq: AtomicI64::new(0),
            config,
        }
    }

    /// Invoke `service.method` with `args` and decode the reply, using the
    /// configured default timeout.
    pub async fn invoke<A, R>(&self, service: &str, method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.invoke_with_timeout(service, method, args, self.config.call_timeout)
            .await
    }

    /// Invoke with a per-call timeout override.
    ///
    /// On timeout the pending slot is evicted, so a late response is
    /// dropped instead of being delivered to a stale waiter.
    pub async fn invoke_with_timeout<A, R>(
        &self,
        service: &str,
        method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let params = self.codec.encode(args)?;
        let seq = self.next_seq();
        let request = RequestEnvelope {
            service: service.to_string(),
            method: method.to_string(),
            params,
            headers: None,
            seq,
        };
        let frame = self.codec.encode(&request)?;

        // Slot registration must happen-before the write: once the frame is
        // on the wire a response can race back on another task.
        let slot = self.pending.register(seq);

        let channel = match self.pool.acquire().await {
            Ok(channel) => channel,
            Err(error) => {
                self.pending.evict(seq);
                return Err(error.into());
            }
        };
        let written = channel.write(frame);
        // Fire-and-forget send: the channel goes straight back to the pool,
        // the response arrives on the shared delivery path.
        self.pool.release(channel);
        if let Err(error) = written {
            self.pending.evict(seq);
            return Err(error.into());
        }

        let response = match tokio::time::timeout(timeout, slot).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Sender dropped without a send; the slot is already gone.
                return Err(TransportError::ConnectionClosed.into());
            }
            Err(_) => {
                self.pending.evict(seq);
                return Err(RpcError::Timeout);
            }
        };

        match response.status {
            Status::Success => {
                let result = response.result.unwrap_or_default();
                Ok(self.codec.decode(&result)?)
            }
            Status::Failed => Err(RpcError::Remote(
                response
                    .error_msg
                    .unwrap_or_else(|| "unspecified remote error".to_string()),
            )),
        }
    }

    /// Number of calls currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// The underlying channel pool (capacity and liveness introspection).
    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    /// Process-wide monotonic within this client, starting at 1.
    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<C: Codec> std::fmt::Debug for RpcClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("pool", &self.pool)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
