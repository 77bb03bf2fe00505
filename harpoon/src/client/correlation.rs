//! Pending-call registry for request-response correlation.
//!
//! Every outbound call registers a one-shot response slot keyed by its
//! sequence number *before* the request is transmitted, so a same-tick
//! response always finds its waiter. The slot is removed exactly once,
//! by whichever of response delivery or timeout eviction reaches the map
//! first: removal under the map lock is the arbiter, and the loser finds
//! the entry gone.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::envelope::ResponseEnvelope;

/// Registry of calls awaiting their matching response.
///
/// The map is guarded internally; callers never take an external lock.
/// At most one slot exists per sequence number at any time.
#[derive(Debug, Default)]
pub struct PendingCalls {
    slots: Mutex<HashMap<i64, oneshot::Sender<ResponseEnvelope>>>,
}

impl PendingCalls {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response slot for `seq` and return the receiving end.
    ///
    /// Must happen before the request frame is written, otherwise a fast
    /// response could arrive with no waiter to deliver to. Sequence numbers
    /// are allocated monotonically, so a collision means a stale slot from
    /// a mis-used seq; the old waiter is dropped and will observe a closed
    /// channel.
    pub fn register(&self, seq: i64) -> oneshot::Receiver<ResponseEnvelope> {
        let (tx, rx) = oneshot::channel();
        let previous = self.lock().insert(seq, tx);
        if previous.is_some() {
            tracing::warn!(seq, "replaced existing pending slot for sequence");
        }
        rx
    }

    /// Deliver a response to its waiting slot.
    ///
    /// Returns `false` if no slot exists for the response's seq (call
    /// already timed out, or the response is spurious); the caller logs and
    /// drops it. Never blocks.
    pub fn complete(&self, response: ResponseEnvelope) -> bool {
        let Some(slot) = self.lock().remove(&response.seq) else {
            return false;
        };
        // The receiver may have been dropped between eviction losing the
        // race and this send; either way the slot is gone.
        slot.send(response).is_ok()
    }

    /// Remove the slot for `seq` without delivering anything (timeout
    /// path). Returns whether a slot was present.
    pub fn evict(&self, seq: i64) -> bool {
        self.lock().remove(&seq).is_some()
    }

    /// Number of calls currently awaiting a response.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no calls are pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, oneshot::Sender<ResponseEnvelope>>> {
        self.slots.lock().expect("pending-call map lock poisoned")
    }
}
