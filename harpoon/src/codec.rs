//! Pluggable wire serialization.
//!
//! The [`Codec`] trait is the only serialization contract the rest of the
//! runtime depends on: both the client and the server are generic over
//! `C: Codec`, so swapping the wire format never touches the pool, the
//! correlation layer, or the dispatch table.
//!
//! Two strategies ship with the crate:
//!
//! - [`JsonCodec`]: fully generic structural encoding. Self-describing,
//!   works for arbitrary serde values, human-readable on the wire.
//! - [`BincodeCodec`]: schema-based compact binary encoding. Requires both
//!   sides to agree on the message layout; a payload that does not match the
//!   expected type surfaces as a [`CodecError::Decode`].
//!
//! # Example
//!
//! ```rust
//! use harpoon::{BincodeCodec, Codec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct AddArgs {
//!     a: i64,
//!     b: i64,
//! }
//!
//! let codec = BincodeCodec;
//! let bytes = codec.encode(&AddArgs { a: 1, b: 2 }).unwrap();
//! let decoded: AddArgs = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, AddArgs { a: 1, b: 2 });
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors produced by a [`Codec`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to bytes.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Failed to decode bytes to the expected type.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Converts typed values to and from byte payloads.
///
/// Implementations must be cheap to clone: the server clones the codec into
/// every method closure at registration time, and the client shares one
/// codec between the invoke path and the response-delivery path.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Generic structural codec backed by `serde_json`.
///
/// Works for any serde value without a shared schema, at the cost of a
/// larger and slower wire representation than [`BincodeCodec`]. Useful for
/// debugging with packet inspection and for heterogeneous peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Compact binary codec backed by `bincode`.
///
/// Both peers must agree on the message layout; there is no schema on the
/// wire. Decoding a payload into a type it was not encoded from fails with
/// [`CodecError::Decode`] rather than producing garbage silently (trailing
/// or missing bytes are rejected).
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
