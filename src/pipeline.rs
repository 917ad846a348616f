//! Pipeline owner API
//!
//! A [`VideoPipeline`] ties the pieces together for one video view: the
//! bounded frame buffer, the active decode backend, the health metrics, and
//! the watchdog. The host feeds it encoded access units and render-target
//! lifecycle notifications; it reports back over the event channel handed
//! out at construction.

use crate::backend::{BackendContext, BackendSelection, ModeController};
use crate::backend::software::PlayerFactory;
use crate::buffer::FrameBuffer;
use crate::config::PipelineConfig;
use crate::decode::annexb;
use crate::decode::ffmpeg::FfmpegDecoderFactory;
use crate::decode::DecoderFactory;
use crate::events::{self, EventReceiver, EventSender, PipelineEvent};
use crate::frame::Frame;
use crate::health::{HealthMonitor, HealthSummary, PipelineHealth};
use crate::surface::RenderTarget;
use anyhow::{Context, Result, bail};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Last reported render target and its dimensions
struct TargetState {
    target: Option<Arc<dyn RenderTarget>>,
    width: u32,
    height: u32,
}

/// One ingestion-to-presentation pipeline.
///
/// Thread-safe: the transport callback, the host's lifecycle notifications,
/// and disposal may arrive on arbitrary threads. The health watchdog needs a
/// tokio runtime; constructed outside one, the pipeline still decodes but
/// stall and failure escalations stay disabled.
pub struct VideoPipeline {
    config: PipelineConfig,
    health: Arc<PipelineHealth>,
    monitor: HealthMonitor,
    controller: Mutex<ModeController>,
    target: Mutex<TargetState>,
    events: EventSender,
    sequence: AtomicU64,
    disposed: AtomicBool,
}

impl VideoPipeline {
    /// Build a pipeline with the production FFmpeg decoder.
    ///
    /// The software-player fallback needs a host-supplied [`PlayerFactory`];
    /// it is only consulted after a [`set_backend`] switch.
    ///
    /// [`set_backend`]: VideoPipeline::set_backend
    pub fn new(
        config: PipelineConfig,
        player_factory: Arc<dyn PlayerFactory>,
    ) -> (Self, EventReceiver) {
        Self::with_factories(config, Arc::new(FfmpegDecoderFactory), player_factory)
    }

    /// Build a pipeline with explicit decoder and player factories
    pub fn with_factories(
        config: PipelineConfig,
        decoder_factory: Arc<dyn DecoderFactory>,
        player_factory: Arc<dyn PlayerFactory>,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = events::channel();
        let buffer = Arc::new(FrameBuffer::new(config.queue_capacity));
        let health = Arc::new(PipelineHealth::new());

        let monitor = HealthMonitor::new(health.clone(), tx.clone())
            .with_check_interval(config.check_interval)
            .with_stall_threshold(config.stall_threshold)
            .with_failure_threshold(config.failure_alert_threshold);
        monitor.start();

        let controller = ModeController::new(BackendContext {
            buffer,
            health: health.clone(),
            events: tx.clone(),
            config: config.clone(),
            decoder_factory,
            player_factory,
        });

        let pipeline = Self {
            target: Mutex::new(TargetState {
                target: None,
                width: config.default_width,
                height: config.default_height,
            }),
            config,
            health,
            monitor,
            controller: Mutex::new(controller),
            events: tx,
            sequence: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        };
        (pipeline, rx)
    }

    /// Accept one encoded access unit from the transport.
    ///
    /// Returns `false` when the frame was dropped (full queue, spool
    /// failure, or a disposed pipeline). Never blocks beyond the buffer
    /// mutex.
    pub fn submit_frame(&self, payload: Bytes) -> bool {
        if self.disposed.load(Ordering::Acquire) {
            debug!("VideoPipeline: frame after dispose, ignoring");
            return false;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let keyframe = annexb::contains_idr_or_parameter_sets(&payload);
        self.health.record_arrival(payload.len(), keyframe);
        if sequence % 30 == 0 {
            debug!(
                "VideoPipeline: frame {} ({} bytes), {}",
                sequence,
                payload.len(),
                self.health.summary()
            );
        }

        self.controller
            .lock()
            .unwrap()
            .submit(Frame::new(payload, sequence))
    }

    /// The host's render target became available (or was recreated)
    pub fn on_target_available(
        &self,
        target: Arc<dyn RenderTarget>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            bail!("pipeline disposed");
        }
        let (width, height) = self.effective_dimensions(width, height);
        info!("VideoPipeline: target available at {}x{}", width, height);
        {
            let mut state = self.target.lock().unwrap();
            state.target = Some(target.clone());
            state.width = width;
            state.height = height;
        }

        self.configure_backend(target, width, height)
    }

    /// The host's render target changed size.
    ///
    /// Recorded for the next (re)configuration; the live decoder keeps its
    /// output size since the coded stream did not change.
    pub fn on_target_size_changed(&self, width: u32, height: u32) {
        let (width, height) = self.effective_dimensions(width, height);
        debug!("VideoPipeline: target resized to {}x{}", width, height);
        let mut state = self.target.lock().unwrap();
        state.width = width;
        state.height = height;
    }

    /// Force new decode dimensions, rebuilding the decoder when a target is
    /// bound. Used when the coded stream itself changed resolution.
    pub fn set_target_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            bail!("pipeline disposed");
        }
        let (width, height) = self.effective_dimensions(width, height);
        let target = {
            let mut state = self.target.lock().unwrap();
            state.width = width;
            state.height = height;
            state.target.clone()
        };
        match target {
            Some(target) => {
                info!("VideoPipeline: rebuilding decoder at {}x{}", width, height);
                self.configure_backend(target, width, height)
            }
            None => {
                debug!(
                    "VideoPipeline: dimensions {}x{} recorded, no target yet",
                    width, height
                );
                Ok(())
            }
        }
    }

    /// The host's render target went away.
    ///
    /// Decode resources are released but queued frames are kept so playback
    /// resumes quickly when a new target appears.
    pub fn on_target_destroyed(&self) {
        info!("VideoPipeline: target destroyed");
        self.target.lock().unwrap().target = None;
        self.controller.lock().unwrap().teardown_decoder();
    }

    /// Switch the decode backend.
    ///
    /// A real switch discards queued frames; if a target is bound the new
    /// backend is configured immediately.
    pub fn set_backend(&self, mode: BackendSelection) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            bail!("pipeline disposed");
        }
        let switched = self.controller.lock().unwrap().switch_to(mode);
        if !switched {
            return Ok(());
        }
        let (target, width, height) = {
            let state = self.target.lock().unwrap();
            (state.target.clone(), state.width, state.height)
        };
        match target {
            Some(target) => self.configure_backend(target, width, height),
            None => Ok(()),
        }
    }

    /// Currently selected backend
    pub fn backend(&self) -> BackendSelection {
        self.controller.lock().unwrap().selection()
    }

    /// Snapshot of the pipeline's health counters
    pub fn health(&self) -> HealthSummary {
        self.health.summary()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release everything: watchdog, decoder, worker, queued frames, spool
    /// files. Idempotent and safe to call concurrently; exactly one caller
    /// performs the teardown.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("VideoPipeline: disposing ({})", self.health.summary());
        self.monitor.stop();
        self.target.lock().unwrap().target = None;
        self.controller.lock().unwrap().teardown();
    }

    fn effective_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            warn!(
                "VideoPipeline: unusable dimensions {}x{}, using {}x{}",
                width, height, self.config.default_width, self.config.default_height
            );
            (self.config.default_width, self.config.default_height)
        } else {
            (width, height)
        }
    }

    fn configure_backend(
        &self,
        target: Arc<dyn RenderTarget>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let result = self
            .controller
            .lock()
            .unwrap()
            .configure(target, width, height)
            .context("backend configuration failed");
        if let Err(err) = &result {
            error!("VideoPipeline: {:#}", err);
            let _ = self.events.send(PipelineEvent::Error {
                message: format!("{:#}", err),
                fatal: false,
            });
        }
        result
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}
