//! Scripted decoder, target, and player implementations for tests

use crate::backend::software::{FilePlayer, PlayerFactory};
use crate::decode::{DecodeError, DecoderConfig, DecoderFactory, DecoderHandle, InputStatus};
use crate::surface::{DecodedFrame, RenderTarget};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the scripted factory behaves for one `create` call
#[derive(Debug, Clone, Copy)]
pub enum CreatePlan {
    /// `create` fails outright
    Fail,
    /// `create` succeeds with a handle whose first `fail_inputs` input calls
    /// error (`u32::MAX` = every call)
    Succeed { fail_inputs: u32 },
    /// `create` succeeds with a handle whose first `busy_inputs` input calls
    /// report no free input slot
    Busy { busy_inputs: u32 },
}

/// Factory producing scripted handles in plan order.
///
/// Once the plans run out, further `create` calls succeed with a clean
/// handle. Tracks the number of handles created and the number currently
/// live (created and not yet stopped) so tests can assert single-instance
/// invariants.
pub struct ScriptedFactory {
    plans: Mutex<std::collections::VecDeque<CreatePlan>>,
    created: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(plans: Vec<CreatePlan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            created: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for ScriptedFactory {
    fn create(&self, config: &DecoderConfig) -> Result<Box<dyn DecoderHandle>> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CreatePlan::Succeed { fail_inputs: 0 });
        let (fail_inputs, busy_inputs) = match plan {
            CreatePlan::Fail => bail!("scripted decoder creation failure"),
            CreatePlan::Succeed { fail_inputs } => (fail_inputs, 0),
            CreatePlan::Busy { busy_inputs } => (0, busy_inputs),
        };
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedHandle {
            fail_inputs,
            busy_inputs,
            pending_outputs: 0,
            width: config.width,
            height: config.height,
            live: Some(self.live.clone()),
        }))
    }
}

/// Decoder handle driven by a [`ScriptedFactory`] plan
pub struct ScriptedHandle {
    fail_inputs: u32,
    busy_inputs: u32,
    pending_outputs: usize,
    width: u32,
    height: u32,
    live: Option<Arc<AtomicUsize>>,
}

impl DecoderHandle for ScriptedHandle {
    fn queue_input(
        &mut self,
        _data: &[u8],
        _pts_micros: i64,
        _timeout: Duration,
    ) -> Result<InputStatus, DecodeError> {
        if self.fail_inputs > 0 {
            if self.fail_inputs != u32::MAX {
                self.fail_inputs -= 1;
            }
            return Err(DecodeError::Input("scripted input failure".into()));
        }
        if self.busy_inputs > 0 {
            self.busy_inputs -= 1;
            return Ok(InputStatus::TryAgain);
        }
        self.pending_outputs += 1;
        Ok(InputStatus::Queued)
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<Option<DecodedFrame>, DecodeError> {
        if self.pending_outputs == 0 {
            return Ok(None);
        }
        self.pending_outputs -= 1;
        Ok(Some(DecodedFrame {
            data: vec![0u8; 16],
            width: self.width,
            height: self.height,
            pts_micros: 0,
        }))
    }

    fn stop(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        // A handle dropped without stop() still counts as released
        self.stop();
    }
}

/// Render target counting presented frames
pub struct CollectTarget {
    presented: AtomicUsize,
}

impl CollectTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            presented: AtomicUsize::new(0),
        })
    }

    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

impl RenderTarget for CollectTarget {
    fn present(&self, _frame: DecodedFrame) -> Result<()> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Render target that refuses every frame
pub struct FailTarget;

impl RenderTarget for FailTarget {
    fn present(&self, _frame: DecodedFrame) -> Result<()> {
        bail!("target destroyed")
    }
}

/// File player recording the paths it was asked to play
pub struct RecordingPlayer {
    plays: Arc<Mutex<Vec<PathBuf>>>,
}

impl FilePlayer for RecordingPlayer {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.plays.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Factory for [`RecordingPlayer`]s sharing one play log
pub struct RecordingPlayerFactory {
    plays: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingPlayerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plays: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn plays(&self) -> Vec<PathBuf> {
        self.plays.lock().unwrap().clone()
    }
}

impl PlayerFactory for RecordingPlayerFactory {
    fn create(&self) -> Result<Box<dyn FilePlayer>> {
        Ok(Box::new(RecordingPlayer {
            plays: self.plays.clone(),
        }))
    }
}
