//! Hardware-surface decode backend
//!
//! Owns a decoder session and the worker thread that drives it. Encoded
//! frames go through the shared bounded buffer; decoded frames are presented
//! straight onto the bound render target.

use crate::backend::{BackendContext, DecodeBackend};
use crate::decode::session::{ConfigureRequest, DecoderSession, SessionTuning};
use crate::decode::worker::{DecodeWorker, WorkerConfig};
use crate::frame::Frame;
use crate::surface::RenderTarget;
use anyhow::Result;
use log::{debug, info};
use std::sync::{Arc, Mutex};

struct Active {
    session: Arc<Mutex<DecoderSession>>,
    worker: DecodeWorker,
}

pub struct HardwareSurfaceBackend {
    context: BackendContext,
    active: Option<Active>,
}

impl HardwareSurfaceBackend {
    pub(crate) fn new(context: BackendContext) -> Self {
        Self {
            context,
            active: None,
        }
    }
}

impl DecodeBackend for HardwareSurfaceBackend {
    /// Build the session and spawn the worker. A previous decoder (from an
    /// earlier target or a dimension change) is fully released first, so at
    /// most one decoder instance exists per backend.
    fn configure(&mut self, target: Arc<dyn RenderTarget>, width: u32, height: u32) -> Result<()> {
        self.teardown();

        let config = &self.context.config;
        let tuning = SessionTuning {
            io_timeout: config.io_timeout,
            recovery_width: config.recovery_width,
            recovery_height: config.recovery_height,
        };
        let mut session = DecoderSession::new(
            self.context.decoder_factory.clone(),
            target,
            config.parameter_sets.clone(),
            tuning,
        );
        session.configure(ConfigureRequest {
            width,
            height,
            probe: self.context.buffer.peek_payload(),
        })?;

        let session = Arc::new(Mutex::new(session));
        let worker = DecodeWorker::spawn(
            self.context.buffer.clone(),
            session.clone(),
            self.context.health.clone(),
            self.context.events.clone(),
            WorkerConfig {
                poll_timeout: config.poll_timeout,
                consecutive_error_limit: config.consecutive_error_limit,
                recovery_delay: config.recovery_delay,
            },
        );

        info!("HardwareSurfaceBackend: configured at {}x{}", width, height);
        self.active = Some(Active { session, worker });
        Ok(())
    }

    fn submit(&mut self, frame: Frame) -> bool {
        let accepted = self.context.buffer.submit(frame);
        if !accepted {
            self.context.health.record_frame_drop();
        }
        accepted
    }

    fn teardown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        debug!("HardwareSurfaceBackend: tearing down");
        // Stop the worker before disposing so no decode call races the
        // release.
        active.worker.shutdown();
        active.session.lock().unwrap().dispose();
    }
}

impl Drop for HardwareSurfaceBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
