//! Request and response envelopes.
//!
//! Envelopes are the structured messages exchanged between client and
//! server, independent of wire encoding: the chosen [`Codec`] turns them
//! into byte frames, and the argument/reply payloads inside them are
//! themselves codec-encoded bytes, opaque to the envelope.
//!
//! [`Codec`]: crate::Codec

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Outcome of a remote invocation, carried in every [`ResponseEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The handler ran and produced a reply.
    Success,
    /// The call failed somewhere past the transport: unknown service or
    /// method, argument decode failure, or a handler error.
    Failed,
}

/// One outbound call: which method of which service, with what arguments.
///
/// `seq` is unique for the lifetime of the pending call within one client
/// instance; correlation happens per client, so process-global uniqueness
/// is not required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Registered service name.
    pub service: String,
    /// Method name within the service.
    pub method: String,
    /// Codec-encoded argument payload.
    pub params: Vec<u8>,
    /// Optional application metadata.
    pub headers: Option<HashMap<String, String>>,
    /// Correlation sequence number, allocated by the client.
    pub seq: i64,
}

impl RequestEnvelope {
    /// Attach a header, allocating the map on first use.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// The answer to one [`RequestEnvelope`], echoing its `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Whether the invocation succeeded.
    pub status: Status,
    /// Codec-encoded reply payload. Present iff `status` is `Success`.
    pub result: Option<Vec<u8>>,
    /// Error text. Present iff `status` is `Failed`.
    pub error_msg: Option<String>,
    /// Application metadata.
    pub headers: HashMap<String, String>,
    /// The originating request's sequence number.
    pub seq: i64,
}

impl ResponseEnvelope {
    /// Build a success response carrying an encoded reply.
    pub fn success(seq: i64, result: Vec<u8>) -> Self {
        Self {
            status: Status::Success,
            result: Some(result),
            error_msg: None,
            headers: HashMap::new(),
            seq,
        }
    }

    /// Build a failure response carrying an error message.
    pub fn failed(seq: i64, error_msg: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            result: None,
            error_msg: Some(error_msg.into()),
            headers: HashMap::new(),
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BincodeCodec, Codec, JsonCodec};

    fn sample_request() -> RequestEnvelope {
        RequestEnvelope {
            service: "Calc".to_string(),
            method: "Add".to_string(),
            params: vec![1, 2, 3],
            headers: None,
            seq: 7,
        }
        .with_header("trace-id", "abc123")
    }

    #[test]
    fn request_roundtrip_both_codecs() {
        let request = sample_request();

        let bytes = BincodeCodec.encode(&request).unwrap();
        let decoded: RequestEnvelope = BincodeCodec.decode(&bytes).unwrap();
        assert_eq!(request, decoded);

        let bytes = JsonCodec.encode(&request).unwrap();
        let decoded: RequestEnvelope = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(request, decoded);
    }

    #[test]
    fn response_roundtrip_both_codecs() {
        let success = ResponseEnvelope::success(7, vec![9, 9]);
        let failed = ResponseEnvelope::failed(8, "boom");

        for response in [success, failed] {
            let bytes = BincodeCodec.encode(&response).unwrap();
            let decoded: ResponseEnvelope = BincodeCodec.decode(&bytes).unwrap();
            assert_eq!(response, decoded);

            let bytes = JsonCodec.encode(&response).unwrap();
            let decoded: ResponseEnvelope = JsonCodec.decode(&bytes).unwrap();
            assert_eq!(response, decoded);
        }
    }

    #[test]
    fn response_constructors() {
        let success = ResponseEnvelope::success(1, vec![0]);
        assert_eq!(success.status, Status::Success);
        assert!(success.result.is_some());
        assert!(success.error_msg.is_none());
        assert_eq!(success.seq, 1);

        let failed = ResponseEnvelope::failed(2, "no such service");
        assert_eq!(failed.status, Status::Failed);
        assert!(failed.result.is_none());
        assert_eq!(failed.error_msg.as_deref(), Some("no such service"));
        assert_eq!(failed.seq, 2);
    }

    #[test]
    fn header_attachment() {
        let request = sample_request();
        let headers = request.headers.as_ref().unwrap();
        assert_eq!(headers.get("trace-id").map(String::as_str), Some("abc123"));
    }
}
