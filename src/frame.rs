//! Encoded frame payload with arrival metadata

use bytes::Bytes;
use std::time::Instant;

/// One encoded video unit as received from the transport or capture path.
///
/// The payload is opaque coded data (Annex-B H.264 in practice); the pipeline
/// only inspects it for parameter-set markers. A frame is owned by the
/// [`FrameBuffer`](crate::buffer::FrameBuffer) until consumed and is dropped
/// right after decode submission.
#[derive(Clone)]
pub struct Frame {
    /// Encoded payload bytes
    pub payload: Bytes,

    /// Monotonic arrival index assigned by the pipeline
    pub sequence: u64,

    /// When the frame arrived at the pipeline boundary
    pub received_at: Instant,
}

impl Frame {
    /// Create a frame stamped with the current instant
    pub fn new(payload: Bytes, sequence: u64) -> Self {
        Self {
            payload,
            sequence,
            received_at: Instant::now(),
        }
    }

    /// Size of the encoded payload in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("size", &self.size())
            .field("received_at", &self.received_at)
            .finish()
    }
}
