//! Bounded frame queue with drop-newest backpressure
//!
//! Strict FIFO between one producer (the transport callback, on an arbitrary
//! thread) and one consumer (the decode worker), though all operations are
//! safe under arbitrary concurrent use. On overflow the *incoming* frame is
//! rejected so the already-queued run of frames keeps its temporal
//! continuity for low-latency playback.

use crate::frame::Frame;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Bounded FIFO of encoded frames
pub struct FrameBuffer {
    queue: Mutex<VecDeque<Frame>>,
    available: Condvar,
    capacity: usize,
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a frame.
    ///
    /// Returns `false` when the buffer is full: the incoming frame is dropped
    /// and queued frames are left untouched.
    pub fn submit(&self, frame: Frame) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(frame);
        self.available.notify_one();
        true
    }

    /// Dequeue the oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout. A timeout is the consumer's normal idle
    /// path, not an error.
    pub fn try_take(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(frame) = queue.pop_front() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _res) = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap();
            queue = guard;
        }
    }

    /// Payload of the oldest queued frame, if any.
    ///
    /// Used to probe the head of the stream for embedded parameter sets
    /// before the decoder is configured. The frame stays queued.
    pub fn peek_payload(&self) -> Option<Bytes> {
        self.queue
            .lock()
            .unwrap()
            .front()
            .map(|frame| frame.payload.clone())
    }

    /// Discard all queued frames without decoding them.
    ///
    /// Safe to call while a consumer is blocked in [`try_take`]; that call
    /// simply times out or picks up a later submission.
    ///
    /// [`try_take`]: FrameBuffer::try_take
    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// True when no frames are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
