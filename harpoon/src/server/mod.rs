//! RPC server: receives request envelopes, dispatches, answers.
//!
//! Each inbound frame arrives on its own task (the transport spawns one per
//! message), so dispatch of distinct requests is concurrent and no ordering
//! is preserved on the way out — responses are correlated by `seq`, not by
//! arrival order.
//!
//! Every failure past the transport boundary — unknown service, unknown
//! method, argument decode failure, handler error — is converted into a
//! `Failed` response echoing the request's `seq` and sent back on the
//! channel that delivered the request. Nothing on the dispatch path crashes
//! the server.

pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::{BincodeCodec, Codec};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::DispatchError;
use crate::transport::{Channel, ChannelHandler, Listener};

use registry::{ServiceDescriptor, ServiceRegistry};

/// Server hosting registered services on one listening endpoint.
///
/// The service table is owned by the instance; independent servers can
/// coexist in one process (each on its own port).
pub struct RpcServer<C: Codec = BincodeCodec> {
    registry: Arc<ServiceRegistry>,
    codec: C,
}

impl RpcServer<BincodeCodec> {
    /// Server with the default binary codec.
    pub fn new() -> Self {
        Self::with_codec(BincodeCodec)
    }
}

impl Default for RpcServer<BincodeCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> RpcServer<C> {
    /// Server with an explicit wire codec. Must match the clients'.
    pub fn with_codec(codec: C) -> Self {
        Self {
            registry: Arc::new(ServiceRegistry::new()),
            codec,
        }
    }

    /// Register a service. Insert-if-absent by name; returns `false` if a
    /// service with this name already exists.
    pub fn register(&self, descriptor: ServiceDescriptor) -> bool {
        self.registry.register(descriptor)
    }

    /// The service table.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Bind `addr` and start accepting connections.
    ///
    /// Returns once the listener is bound; dispatch runs on background
    /// tasks until the handle is shut down.
    pub async fn serve(self, addr: &str) -> std::io::Result<ServerHandle> {
        let listener = Listener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let handler: Arc<dyn ChannelHandler> = Arc::new(RequestHandler {
            registry: Arc::clone(&self.registry),
            codec: self.codec.clone(),
        });

        tracing::info!(%local_addr, "rpc server listening");
        let accept_loop = tokio::spawn(async move {
            loop {
                match listener.accept(Arc::clone(&handler)).await {
                    Ok(channel) => {
                        tracing::debug!(peer = %channel.peer_addr(), "accepted connection");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed, stopping listener");
                        break;
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            accept_loop,
        })
    }
}

/// Handle on a running server.
pub struct ServerHandle {
    local_addr: std::net::SocketAddr,
    accept_loop: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// The bound listening address (useful with port 0).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Channels already established keep
    /// serving until their peers disconnect.
    pub fn shutdown(self) {
        self.accept_loop.abort();
    }
}

/// Per-connection handler: decode, dispatch, answer.
struct RequestHandler<C: Codec> {
    registry: Arc<ServiceRegistry>,
    codec: C,
}

impl<C: Codec> RequestHandler<C> {
    async fn dispatch(&self, request: RequestEnvelope) -> Result<Vec<u8>, DispatchError> {
        let service = self
            .registry
            .lookup(&request.service)
            .ok_or(DispatchError::ServiceNotFound)?;
        let method =
            service
                .method(&request.method)
                .ok_or_else(|| DispatchError::MethodNotFound {
                    service: request.service.clone(),
                    method: request.method.clone(),
                })?;
        method.invoke(request.params).await
    }
}

#[async_trait]
impl<C: Codec> ChannelHandler for RequestHandler<C> {
    async fn on_message(&self, channel: Channel, frame: Vec<u8>) {
        let request: RequestEnvelope = match self.codec.decode(&frame) {
            Ok(request) => request,
            Err(error) => {
                // No trustworthy seq to correlate a Failed response to.
                tracing::warn!(peer = %channel.peer_addr(), %error, "undecodable request frame dropped");
                return;
            }
        };
        let seq = request.seq;
        let service = request.service.clone();
        let method = request.method.clone();

        let response = match self.dispatch(request).await {
            Ok(reply) => ResponseEnvelope::success(seq, reply),
            Err(error) => {
                tracing::debug!(%service, %method, seq, %error, "dispatch failed");
                ResponseEnvelope::failed(seq, error.to_string())
            }
        };

        // Answer on whatever channel delivered the request.
        match self.codec.encode(&response) {
            Ok(frame) => {
                if let Err(error) = channel.write(frame) {
                    tracing::warn!(peer = %channel.peer_addr(), seq, %error, "failed to write response");
                }
            }
            Err(error) => {
                tracing::error!(seq, %error, "failed to encode response envelope");
            }
        }
    }
}
