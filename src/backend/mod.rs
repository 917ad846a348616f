//! Decode backends and the mode controller
//!
//! Two mutually exclusive strategies turn encoded frames into rendered
//! video: direct decode onto the host surface
//! ([`hardware::HardwareSurfaceBackend`]) or a file-backed software player
//! ([`software::SoftwarePlayerBackend`]). The [`ModeController`] guarantees
//! at most one backend instance is live at any time: a switch fully tears
//! the old one down before building the new one.

pub mod hardware;
pub mod software;

use crate::buffer::FrameBuffer;
use crate::config::PipelineConfig;
use crate::decode::DecoderFactory;
use crate::events::EventSender;
use crate::frame::Frame;
use crate::health::PipelineHealth;
use crate::surface::RenderTarget;
use anyhow::Result;
use log::{debug, info};
use software::PlayerFactory;
use std::sync::Arc;

/// Which decode strategy is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// Decode directly onto the host render target
    HardwareSurface,
    /// Materialize received bytes to a file and hand it to a player
    SoftwarePlayer,
}

impl std::fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSelection::HardwareSurface => write!(f, "HardwareSurface"),
            BackendSelection::SoftwarePlayer => write!(f, "SoftwarePlayer"),
        }
    }
}

/// Capability set every backend satisfies
pub trait DecodeBackend: Send {
    /// Bind the render target and (re)build the decode resources
    fn configure(&mut self, target: Arc<dyn RenderTarget>, width: u32, height: u32) -> Result<()>;

    /// Accept one encoded frame; `false` means it was dropped
    fn submit(&mut self, frame: Frame) -> bool;

    /// Release decode resources, keeping the backend selectable again
    fn teardown(&mut self);
}

/// Everything a backend needs from the pipeline, cloneable per rebuild
#[derive(Clone)]
pub(crate) struct BackendContext {
    pub buffer: Arc<FrameBuffer>,
    pub health: Arc<PipelineHealth>,
    pub events: EventSender,
    pub config: PipelineConfig,
    pub decoder_factory: Arc<dyn DecoderFactory>,
    pub player_factory: Arc<dyn PlayerFactory>,
}

/// Holds the current backend selection and the single live backend instance
pub struct ModeController {
    selection: BackendSelection,
    backend: Box<dyn DecodeBackend>,
    context: BackendContext,
}

impl ModeController {
    pub(crate) fn new(context: BackendContext) -> Self {
        let selection = BackendSelection::HardwareSurface;
        let backend = Self::build(selection, &context);
        Self {
            selection,
            backend,
            context,
        }
    }

    pub fn selection(&self) -> BackendSelection {
        self.selection
    }

    /// Switch decode strategy.
    ///
    /// No-op when the mode is unchanged. Otherwise the current backend is
    /// torn down completely (worker joined, decoder disposed, queued frames
    /// and spool artifacts discarded) before the replacement exists, so two
    /// decoder instances are never bound to the same target. Returns whether
    /// a switch happened.
    pub fn switch_to(&mut self, mode: BackendSelection) -> bool {
        if mode == self.selection {
            debug!("ModeController: already in {} mode", mode);
            return false;
        }
        info!("ModeController: switching {} -> {}", self.selection, mode);
        self.backend.teardown();
        self.context.buffer.clear();
        self.backend = Self::build(mode, &self.context);
        self.selection = mode;
        true
    }

    pub fn configure(
        &mut self,
        target: Arc<dyn RenderTarget>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.backend.configure(target, width, height)
    }

    pub fn submit(&mut self, frame: Frame) -> bool {
        self.backend.submit(frame)
    }

    /// Tear down decode resources but keep queued frames and the selection.
    /// Used when the render target goes away under a live pipeline.
    pub fn teardown_decoder(&mut self) {
        self.backend.teardown();
    }

    /// Full teardown on disposal: decode resources and queued frames
    pub fn teardown(&mut self) {
        self.backend.teardown();
        self.context.buffer.clear();
    }

    fn build(mode: BackendSelection, context: &BackendContext) -> Box<dyn DecodeBackend> {
        match mode {
            BackendSelection::HardwareSurface => {
                Box::new(hardware::HardwareSurfaceBackend::new(context.clone()))
            }
            BackendSelection::SoftwarePlayer => {
                Box::new(software::SoftwarePlayerBackend::new(context.clone()))
            }
        }
    }
}
