//! framepipe
//!
//! A real-time pipeline for encoded H.264 video: frames arrive from a
//! transport callback, pass through a bounded drop-newest buffer, and are
//! decoded on a dedicated worker thread that owns the consecutive-error
//! recovery policy. A tokio watchdog task reports stalled streams and
//! repeated decode failures over the pipeline's event channel.
//!
//! The host integrates at three seams:
//! - [`RenderTarget`] receives decoded frames (packed YUV 4:2:0),
//! - [`PlayerFactory`](backend::software::PlayerFactory) backs the
//!   software-player fallback,
//! - [`PipelineRegistry`] routes frames from transport callbacks to the
//!   per-view [`VideoPipeline`] instances.
//!
//! ```no_run
//! use framepipe::{PipelineConfig, PipelineRegistry, VideoPipeline, ViewId};
//! # use std::sync::Arc;
//! # fn host_player_factory() -> Arc<dyn framepipe::backend::software::PlayerFactory> { unimplemented!() }
//!
//! # async fn example() {
//! let registry = PipelineRegistry::new();
//! let (pipeline, mut events) = VideoPipeline::new(
//!     PipelineConfig::default(),
//!     host_player_factory(),
//! );
//! registry.register(ViewId(1), Arc::new(pipeline));
//!
//! while let Some(event) = events.recv().await {
//!     log::info!("pipeline: {}", event);
//! }
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod decode;
pub mod events;
pub mod frame;
pub mod health;
pub mod pipeline;
pub mod registry;
pub mod surface;

#[cfg(test)]
mod testutil;

pub use backend::BackendSelection;
pub use buffer::FrameBuffer;
pub use config::PipelineConfig;
pub use events::{EventReceiver, PipelineEvent};
pub use frame::Frame;
pub use health::{HealthSummary, PipelineHealth};
pub use pipeline::VideoPipeline;
pub use registry::{PipelineRegistry, ViewId};
pub use surface::{DecodedFrame, RenderTarget};
