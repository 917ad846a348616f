//! Software-player decode backend
//!
//! Fallback path for hosts without a usable decode surface. Received frames
//! are materialized as raw H.264 files in the spool directory and handed to
//! an external player. The backend owns the spool artifacts and removes
//! them on teardown.

use crate::backend::{BackendContext, DecodeBackend};
use crate::events::PipelineEvent;
use crate::frame::Frame;
use crate::surface::RenderTarget;
use anyhow::Result;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Plays spooled video files
pub trait FilePlayer: Send {
    fn play(&mut self, path: &Path) -> Result<()>;
    fn stop(&mut self);
}

/// Creates [`FilePlayer`] instances
pub trait PlayerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FilePlayer>>;
}

pub struct SoftwarePlayerBackend {
    context: BackendContext,
    player: Option<Box<dyn FilePlayer>>,
    spooled: Vec<PathBuf>,
    next_index: u64,
}

impl SoftwarePlayerBackend {
    pub(crate) fn new(context: BackendContext) -> Self {
        Self {
            context,
            player: None,
            spooled: Vec::new(),
            next_index: 0,
        }
    }

    fn spool(&mut self, frame: &Frame) -> Result<PathBuf> {
        fs::create_dir_all(&self.context.config.spool_dir)?;
        let path = self
            .context
            .config
            .spool_dir
            .join(format!("temp_video_{}.h264", self.next_index));
        self.next_index += 1;
        fs::write(&path, &frame.payload)?;
        self.spooled.push(path.clone());
        Ok(path)
    }

    fn report(&self, message: String) {
        warn!("SoftwarePlayerBackend: {}", message);
        let _ = self.context.events.send(PipelineEvent::Error {
            message,
            fatal: false,
        });
    }
}

impl DecodeBackend for SoftwarePlayerBackend {
    /// The render target and dimensions are the player's concern; this
    /// backend only needs a player instance.
    fn configure(
        &mut self,
        _target: Arc<dyn RenderTarget>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if let Some(mut old) = self.player.take() {
            old.stop();
        }
        self.player = Some(self.context.player_factory.create()?);
        info!(
            "SoftwarePlayerBackend: player ready (host surface {}x{})",
            width, height
        );
        Ok(())
    }

    fn submit(&mut self, frame: Frame) -> bool {
        let path = match self.spool(&frame) {
            Ok(path) => path,
            Err(err) => {
                self.context.health.record_frame_drop();
                self.report(format!("failed to spool frame {}: {}", frame.sequence, err));
                return false;
            }
        };

        // Frames arriving before configure() still get a player on demand.
        if self.player.is_none() {
            match self.context.player_factory.create() {
                Ok(player) => self.player = Some(player),
                Err(err) => {
                    self.report(format!("player unavailable: {}", err));
                    return false;
                }
            }
        }

        let Some(player) = self.player.as_mut() else {
            return false;
        };
        if let Err(err) = player.play(&path) {
            self.context.health.record_frame_drop();
            self.report(format!("playback failed for {}: {}", path.display(), err));
            return false;
        }
        true
    }

    fn teardown(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.stop();
        }
        for path in self.spooled.drain(..) {
            if let Err(err) = fs::remove_file(&path) {
                debug!(
                    "SoftwarePlayerBackend: leaving spool file {}: {}",
                    path.display(),
                    err
                );
            }
        }
    }
}

impl Drop for SoftwarePlayerBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
