//! # Harpoon
//!
//! A pooled-connection RPC runtime: a client that invokes named methods on
//! a remote service over a bounded connection pool, and a server that
//! dispatches inbound calls through a statically-built method table —
//! without caller and callee sharing compiled code.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │          RpcClient           │   │          RpcServer           │
//! │  seq counter + PendingCalls  │   │  ServiceRegistry             │
//! │  ChannelPool (bounded, lazy) │   │   └─ ServiceDescriptor       │
//! └──────────────┬───────────────┘   │       └─ MethodDescriptor    │
//!                │                   └──────────────┬───────────────┘
//!        RequestEnvelope / ResponseEnvelope  (Codec: json or bincode)
//!                │                                  │
//! ┌──────────────┴──────────────────────────────────┴───────────────┐
//! │  transport: framed TCP channels, handler callbacks, liveness    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A call encodes its arguments, registers a response slot keyed by a fresh
//! sequence number, writes the frame on a pooled channel, releases the
//! channel immediately, and waits on the slot with a timeout. Responses
//! arrive on an independent delivery path and are correlated solely by
//! `seq`; ordering across calls is deliberately unspecified.
//!
//! ## Quick start
//!
//! ```ignore
//! use harpoon::{BincodeCodec, RpcClient, RpcServer, ServiceBuilder};
//!
//! let server = RpcServer::new();
//! server.register(
//!     ServiceBuilder::new("Calc", BincodeCodec)
//!         .method("Add", |args: AddArgs| async move {
//!             Ok::<_, std::convert::Infallible>(AddReply { sum: args.a + args.b })
//!         })
//!         .finish(),
//! );
//! let handle = server.serve("127.0.0.1:4500").await?;
//!
//! let client = RpcClient::new(handle.local_addr().to_string());
//! let reply: AddReply = client.invoke("Calc", "Add", &AddArgs { a: 1, b: 2 }).await?;
//! ```

#![deny(missing_docs)]

pub mod client;
pub mod codec;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod server;
pub mod transport;

pub use client::pool::ChannelPool;
pub use client::{ClientConfig, RpcClient};
pub use codec::{BincodeCodec, Codec, CodecError, JsonCodec};
pub use discovery::{Discovery, DiscoveryError, ServiceId, ServiceLocation, StaticDiscovery};
pub use envelope::{RequestEnvelope, ResponseEnvelope, Status};
pub use error::{DispatchError, RpcError, TransportError};
pub use server::registry::{MethodDescriptor, ServiceBuilder, ServiceDescriptor, ServiceRegistry};
pub use server::{RpcServer, ServerHandle};
pub use transport::{Channel, ChannelHandler, Listener, MAX_FRAME_SIZE};
