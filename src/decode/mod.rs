//! Decoder abstraction and decode pipeline
//!
//! Splits the decode path into the seams the rest of the pipeline relies on:
//! - [`DecoderHandle`]/[`DecoderFactory`]: one underlying decoder instance
//!   with bounded-wait input and output operations (the ffmpeg
//!   implementation lives in [`ffmpeg`]; tests inject scripted handles).
//! - [`session::DecoderSession`]: the state machine binding one handle to
//!   one render target.
//! - [`worker::DecodeWorker`]: the dedicated thread draining the frame
//!   buffer through the session.
//!
//! Errors in the hot loop are explicit [`DecodeError`] values consumed by
//! the worker's counter logic; nothing in this module panics past its API.

pub mod annexb;
pub mod ffmpeg;
pub mod session;
pub mod worker;

use crate::surface::DecodedFrame;
use annexb::ParameterSets;
use anyhow::Result;
use std::time::Duration;

pub use ffmpeg::FfmpegDecoderFactory;
pub use session::{ConfigureRequest, DecoderSession, SessionState};
pub use worker::DecodeWorker;

/// What configure() hands to a [`DecoderFactory`]
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub width: u32,
    pub height: u32,
    pub parameter_sets: ParameterSets,
}

/// Outcome of a bounded input-slot wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// The unit was accepted by the decoder
    Queued,
    /// No input slot freed up within the timeout; retry with a later unit
    TryAgain,
}

/// Result of one `submit_encoded` call
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOutcome {
    /// Whether the input unit was accepted (false = input-slot timeout)
    pub queued: bool,
    /// Decoded output units released to the render target
    pub rendered: usize,
}

/// Decode-path error kinds.
///
/// These flow back to the worker as values; only the worker's threshold
/// logic decides what crosses the component boundary.
#[derive(Debug, Clone)]
pub enum DecodeError {
    /// The session is not in a state that accepts input
    NotRunning,
    /// The session was disposed; the caller should stop
    Disposed,
    /// The decoder rejected or failed on an input unit
    Input(String),
    /// Draining decoded output failed
    Output(String),
    /// The render target refused a decoded frame
    Render(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::NotRunning => write!(f, "decoder session is not running"),
            DecodeError::Disposed => write!(f, "decoder session is disposed"),
            DecodeError::Input(msg) => write!(f, "decoder input error: {}", msg),
            DecodeError::Output(msg) => write!(f, "decoder output error: {}", msg),
            DecodeError::Render(msg) => write!(f, "render target error: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One live decoder instance.
///
/// Mirrors the shape of a surface-bound hardware codec: input units are
/// queued into a limited pool of input slots, decoded output units are
/// drained and released for presentation. Both operations take an explicit
/// timeout and must never block past it.
pub trait DecoderHandle: Send {
    /// Queue one encoded unit, waiting up to `timeout` for an input slot
    fn queue_input(
        &mut self,
        data: &[u8],
        pts_micros: i64,
        timeout: Duration,
    ) -> Result<InputStatus, DecodeError>;

    /// Take the next decoded output unit if one is ready within `timeout`
    fn dequeue_output(&mut self, timeout: Duration) -> Result<Option<DecodedFrame>, DecodeError>;

    /// Stop the decoder and release its resources; called exactly once
    /// before the handle is dropped
    fn stop(&mut self);
}

/// Creates decoder handles for a given configuration.
///
/// The factory is consulted at initial configuration and again on every
/// recovery reconfiguration, so implementations must be safe to call
/// repeatedly.
pub trait DecoderFactory: Send + Sync {
    fn create(&self, config: &DecoderConfig) -> Result<Box<dyn DecoderHandle>>;
}
