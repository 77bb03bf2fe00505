//! Error types for the RPC runtime.
//!
//! The taxonomy separates failures by where they surface:
//!
//! - [`TransportError`]: connect or write failed locally. Returned directly
//!   to the caller, never retried.
//! - [`RpcError::Timeout`]: no matching response within the window.
//! - [`CodecError`]: payload did not conform to the expected encoding. On
//!   the client encode path it surfaces locally; on the server decode path
//!   it is converted into a `Failed` response instead of crashing the
//!   server.
//! - [`DispatchError`]: server-side routing and invocation failures, all of
//!   which become `Failed` responses.
//! - [`RpcError::Remote`]: the text carried back in a `Failed` response,
//!   whatever its origin on the server.
//!
//! [`CodecError`]: crate::CodecError

use thiserror::Error;

use crate::codec::CodecError;

/// Errors returned by [`RpcClient::invoke`](crate::RpcClient::invoke).
#[derive(Debug, Error)]
pub enum RpcError {
    /// Could not reach the remote peer or write the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No response with the matching sequence number arrived in time.
    #[error("request timeout")]
    Timeout,

    /// Encoding the request or decoding the reply failed locally.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server answered with a `Failed` envelope; the message is carried
    /// verbatim.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Errors from the transport layer and the connection pool.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing a new connection failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// The remote address that refused us.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The channel is no longer active; the peer closed or the socket
    /// errored.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket I/O failed mid-stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound frame announced a length over the limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced payload size.
        size: usize,
        /// Maximum accepted payload size.
        max: usize,
    },

    /// The pool was shut down while a caller was waiting for a channel.
    #[error("connection pool closed")]
    PoolClosed,
}

/// Server-side failures on the dispatch path.
///
/// Every variant is converted into a `Failed` response envelope and sent
/// back to the caller; none of them crash the server.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No service registered under the requested name.
    #[error("service not exist or service not registered")]
    ServiceNotFound,

    /// The service exists but has no such method.
    #[error("method not found: {service}.{method}")]
    MethodNotFound {
        /// The service that was looked up.
        service: String,
        /// The missing method name.
        method: String,
    },

    /// The argument payload did not decode into the method's argument type.
    #[error("decode arguments failed: {0}")]
    DecodeArgs(CodecError),

    /// The reply value failed to encode.
    #[error("encode reply failed: {0}")]
    EncodeReply(CodecError),

    /// The handler itself returned an error; carried as text.
    #[error("{0}")]
    Application(String),
}
