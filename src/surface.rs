//! Render target seam between the decode pipeline and the host
//!
//! The host supplies the actual display surface (a GPU texture, a widget
//! canvas); the pipeline only needs somewhere to release decoded output and
//! lifecycle notifications when that somewhere appears, resizes, or goes
//! away. Those notifications arrive through
//! [`VideoPipeline`](crate::pipeline::VideoPipeline) methods; this module
//! defines the presentation half.

use anyhow::Result;

/// Decoded video frame released for presentation.
///
/// Packed planar YUV420: Y plane (`width * height`) followed by U and V
/// planes (`width/2 * height/2` each), stride padding stripped.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in microseconds on the decoder's clock
    pub pts_micros: i64,
}

/// A renderable output target bound to exactly one decoder session at a time.
///
/// `present` is called from the decode worker thread; implementations must
/// hand the frame off quickly (upload, swap, enqueue) rather than block the
/// decode loop. An error fault the owning session and feeds the recovery
/// machinery, so only report failures that mean the target is unusable.
pub trait RenderTarget: Send + Sync {
    fn present(&self, frame: DecodedFrame) -> Result<()>;
}
