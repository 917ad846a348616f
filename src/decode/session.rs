//! Decoder session state machine
//!
//! A session binds exactly one decoder handle to one render target. All
//! transitions happen on the decode worker thread or through an explicit
//! owner `dispose()`; the health monitor never touches a session.
//!
//! ```text
//! Uninitialized -> Configuring -> Running <-> Faulted -> Recovering -> Running
//!                        |                                    |
//!                        v                                    v
//!                     Faulted                            Terminated
//! (any state) -> Terminated on dispose
//! ```

use crate::decode::annexb::{self, ParameterSets};
use crate::decode::{
    DecodeError, DecoderConfig, DecoderFactory, DecoderHandle, InputStatus, SubmitOutcome,
};
use crate::frame::Frame;
use crate::surface::RenderTarget;
use anyhow::{Context, Result, bail};
use bytes::Bytes;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a decoder session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No decoder exists yet
    Uninitialized,
    /// A decoder is being created and started
    Configuring,
    /// Decoding; input accepted
    Running,
    /// The last decode call failed; awaiting recovery or disposal
    Faulted,
    /// The failed decoder was torn down; a reconfiguration is pending
    Recovering,
    /// Permanently released; no further operations succeed
    Terminated,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Configuring => "Configuring",
            SessionState::Running => "Running",
            SessionState::Faulted => "Faulted",
            SessionState::Recovering => "Recovering",
            SessionState::Terminated => "Terminated",
        };
        write!(f, "{}", name)
    }
}

/// Inputs for a (re)configuration attempt
#[derive(Debug, Clone)]
pub struct ConfigureRequest {
    pub width: u32,
    pub height: u32,
    /// Payload of the oldest buffered frame, scanned for in-band parameter
    /// sets when no out-of-band ones were supplied
    pub probe: Option<Bytes>,
}

/// Session-level tuning, derived from the pipeline configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionTuning {
    /// Bounded wait for decoder input/output operations
    pub io_timeout: Duration,
    /// Fallback dimensions for a recovery with no usable last-known size
    pub recovery_width: u32,
    pub recovery_height: u32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(10),
            recovery_width: 640,
            recovery_height: 480,
        }
    }
}

/// The stateful binding between one decoder instance and one render target
pub struct DecoderSession {
    state: SessionState,
    width: u32,
    height: u32,
    factory: Arc<dyn DecoderFactory>,
    target: Arc<dyn RenderTarget>,
    handle: Option<Box<dyn DecoderHandle>>,
    /// Out-of-band parameter sets, taking priority over any in-band scan
    explicit_sets: Option<ParameterSets>,
    /// Parameter sets the last configuration resolved to
    resolved_sets: Option<ParameterSets>,
    /// Prepend the resolved parameter sets to the next accepted input unit
    prefix_pending: bool,
    consecutive_errors: u32,
    last_output: Option<Instant>,
    started_at: Instant,
    tuning: SessionTuning,
}

impl DecoderSession {
    pub fn new(
        factory: Arc<dyn DecoderFactory>,
        target: Arc<dyn RenderTarget>,
        explicit_sets: Option<ParameterSets>,
        tuning: SessionTuning,
    ) -> Self {
        Self {
            state: SessionState::Uninitialized,
            width: 0,
            height: 0,
            factory,
            target,
            handle: None,
            explicit_sets,
            resolved_sets: None,
            prefix_pending: false,
            consecutive_errors: 0,
            last_output: None,
            started_at: Instant::now(),
            tuning,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn last_output(&self) -> Option<Instant> {
        self.last_output
    }

    /// Create and start a decoder for the given target and dimensions.
    ///
    /// Parameter sets are resolved in priority order: explicit out-of-band
    /// configuration, scan of the probe payload, hardcoded defaults. On
    /// failure the session is left `Faulted` with no live decoder.
    pub fn configure(&mut self, request: ConfigureRequest) -> Result<()> {
        if self.state.is_terminated() {
            bail!("cannot configure a terminated session");
        }
        self.state = SessionState::Configuring;
        self.width = request.width;
        self.height = request.height;

        let sets = self.resolve_parameter_sets(request.probe.as_deref());
        self.start_decoder(request.width, request.height, sets)
            .map_err(|err| {
                self.state = SessionState::Faulted;
                err
            })
    }

    fn resolve_parameter_sets(&self, probe: Option<&[u8]>) -> ParameterSets {
        if let Some(sets) = &self.explicit_sets {
            debug!("DecoderSession: using out-of-band parameter sets");
            return sets.clone();
        }
        // Only the head of the queue is scanned; streams that send their
        // parameter sets later fall back to the defaults.
        if let Some(data) = probe
            && let Some(sets) = annexb::extract_parameter_sets(data)
        {
            info!("DecoderSession: parameter sets extracted from first buffered frame");
            return sets;
        }
        warn!("DecoderSession: no parameter sets found, using defaults");
        ParameterSets::fallback()
    }

    fn start_decoder(&mut self, width: u32, height: u32, sets: ParameterSets) -> Result<()> {
        let config = DecoderConfig {
            width,
            height,
            parameter_sets: sets.clone(),
        };
        let handle = self
            .factory
            .create(&config)
            .with_context(|| format!("failed to start {}x{} decoder", width, height))?;

        self.handle = Some(handle);
        self.resolved_sets = Some(sets);
        self.prefix_pending = true;
        self.consecutive_errors = 0;
        self.state = SessionState::Running;
        info!("DecoderSession: running at {}x{}", width, height);
        Ok(())
    }

    /// Feed one encoded unit and drain all currently available output.
    ///
    /// Every wait is bounded by the configured io timeout; an input-slot
    /// timeout is reported as `queued: false`, not as an error. Decode and
    /// presentation failures fault the session and bump the
    /// consecutive-error counter.
    pub fn submit_encoded(&mut self, frame: &Frame) -> Result<SubmitOutcome, DecodeError> {
        match self.state {
            SessionState::Terminated => return Err(DecodeError::Disposed),
            // A faulted session keeps accepting input so the error counter
            // reflects every failed frame, not just the first one.
            SessionState::Running | SessionState::Faulted => {}
            _ => return Err(DecodeError::NotRunning),
        }
        let timeout = self.tuning.io_timeout;
        let pts_micros = self.started_at.elapsed().as_micros() as i64;

        // First unit after (re)configuration carries the parameter sets
        // in-band so decoders without out-of-band config channels see them.
        let prefixed;
        let data: &[u8] = if self.prefix_pending {
            let sets = self
                .resolved_sets
                .clone()
                .unwrap_or_else(ParameterSets::fallback);
            let mut joined = Vec::with_capacity(sets.sps.len() + sets.pps.len() + frame.size());
            joined.extend_from_slice(&sets.annex_b());
            joined.extend_from_slice(&frame.payload);
            prefixed = joined;
            &prefixed
        } else {
            &frame.payload
        };

        let handle = self.handle.as_mut().ok_or(DecodeError::NotRunning)?;
        let queued = match handle.queue_input(data, pts_micros, timeout) {
            Ok(InputStatus::Queued) => true,
            Ok(InputStatus::TryAgain) => {
                debug!(
                    "DecoderSession: no input slot for frame {}, dropping",
                    frame.sequence
                );
                false
            }
            Err(err) => {
                self.fault();
                return Err(err);
            }
        };
        if queued {
            self.prefix_pending = false;
        }

        let mut rendered = 0usize;
        loop {
            match handle.dequeue_output(timeout) {
                Ok(Some(decoded)) => {
                    if let Err(err) = self.target.present(decoded) {
                        self.fault();
                        return Err(DecodeError::Render(err.to_string()));
                    }
                    rendered += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    self.fault();
                    return Err(err);
                }
            }
        }

        self.state = SessionState::Running;
        self.consecutive_errors = 0;
        self.last_output = Some(Instant::now());
        Ok(SubmitOutcome { queued, rendered })
    }

    fn fault(&mut self) {
        self.state = SessionState::Faulted;
        self.consecutive_errors += 1;
    }

    /// Tear down the failed decoder instance ahead of a reconfiguration.
    ///
    /// The caller sleeps out the recovery delay between this and
    /// [`complete_recovery`] without holding the session lock.
    ///
    /// [`complete_recovery`]: DecoderSession::complete_recovery
    pub fn begin_recovery(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        warn!("DecoderSession: tearing down decoder for recovery");
        self.release_handle();
        self.state = SessionState::Recovering;
    }

    /// Reconfigure after a recovery teardown, with the last-known dimensions
    /// or the recovery fallback. A failure here is final: the session is
    /// terminated and will accept nothing further.
    pub fn complete_recovery(&mut self, probe: Option<Bytes>) -> Result<()> {
        if self.state.is_terminated() {
            bail!("cannot recover a terminated session");
        }
        let (width, height) = if self.width > 0 && self.height > 0 {
            (self.width, self.height)
        } else {
            (self.tuning.recovery_width, self.tuning.recovery_height)
        };
        info!("DecoderSession: recovery reconfiguration at {}x{}", width, height);

        let sets = self.resolve_parameter_sets(probe.as_deref());
        match self.start_decoder(width, height, sets) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state = SessionState::Terminated;
                Err(err)
            }
        }
    }

    /// Release the decoder and the target binding. Idempotent; valid in any
    /// state.
    pub fn dispose(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        self.release_handle();
        self.state = SessionState::Terminated;
        debug!("DecoderSession: disposed");
    }

    fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CollectTarget, CreatePlan, FailTarget, ScriptedFactory};

    fn frame(sequence: u64) -> Frame {
        Frame::new(Bytes::from_static(b"\x00\x00\x00\x01\x65unit"), sequence)
    }

    fn request() -> ConfigureRequest {
        ConfigureRequest {
            width: 320,
            height: 240,
            probe: None,
        }
    }

    #[test]
    fn test_configure_reaches_running() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 0 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory.clone(), target.clone(), None, SessionTuning::default());

        assert_eq!(session.state(), SessionState::Uninitialized);
        session.configure(request()).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.dimensions(), (320, 240));
    }

    #[test]
    fn test_configure_failure_faults() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Fail]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target, None, SessionTuning::default());

        assert!(session.configure(request()).is_err());
        assert_eq!(session.state(), SessionState::Faulted);
    }

    #[test]
    fn test_submit_before_configure_is_not_running() {
        let factory = ScriptedFactory::new(vec![]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target, None, SessionTuning::default());

        match session.submit_encoded(&frame(0)) {
            Err(DecodeError::NotRunning) => {}
            other => panic!("unexpected outcome: {:?}", other.map(|o| o.queued)),
        }
    }

    #[test]
    fn test_submit_renders_to_target() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 0 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target.clone(), None, SessionTuning::default());
        session.configure(request()).unwrap();

        let outcome = session.submit_encoded(&frame(0)).unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.rendered, 1);
        assert_eq!(target.presented(), 1);
        assert!(session.last_output().is_some());
    }

    #[test]
    fn test_decode_error_faults_and_counts() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 2 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target, None, SessionTuning::default());
        session.configure(request()).unwrap();

        assert!(session.submit_encoded(&frame(0)).is_err());
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(session.consecutive_errors(), 1);
    }

    #[test]
    fn test_faulted_session_keeps_counting_errors() {
        // The error counter must reflect every failed frame so the worker's
        // recovery threshold is eventually crossed.
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 3 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target.clone(), None, SessionTuning::default());
        session.configure(request()).unwrap();

        for expected in 1..=3u32 {
            assert!(session.submit_encoded(&frame(expected as u64)).is_err());
            assert_eq!(session.state(), SessionState::Faulted);
            assert_eq!(session.consecutive_errors(), expected);
        }

        // A successful decode clears the fault and the counter
        let outcome = session.submit_encoded(&frame(4)).unwrap();
        assert_eq!(outcome.rendered, 1);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.consecutive_errors(), 0);
        assert_eq!(target.presented(), 1);
    }

    #[test]
    fn test_input_slot_timeout_is_not_a_fault() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Busy { busy_inputs: 1 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target.clone(), None, SessionTuning::default());
        session.configure(request()).unwrap();

        let outcome = session.submit_encoded(&frame(0)).unwrap();
        assert!(!outcome.queued);
        assert_eq!(outcome.rendered, 0);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.consecutive_errors(), 0);

        let outcome = session.submit_encoded(&frame(1)).unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.rendered, 1);
        assert_eq!(target.presented(), 1);
    }

    #[test]
    fn test_render_failure_faults() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 0 }]);
        let mut session = DecoderSession::new(
            factory,
            Arc::new(FailTarget),
            None,
            SessionTuning::default(),
        );
        session.configure(request()).unwrap();

        match session.submit_encoded(&frame(0)) {
            Err(DecodeError::Render(_)) => {}
            other => panic!("expected render error, got {:?}", other.map(|o| o.rendered)),
        }
        assert_eq!(session.state(), SessionState::Faulted);
    }

    #[test]
    fn test_recovery_roundtrip() {
        let factory = ScriptedFactory::new(vec![
            CreatePlan::Succeed {
                fail_inputs: u32::MAX,
            },
            CreatePlan::Succeed { fail_inputs: 0 },
        ]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory.clone(), target.clone(), None, SessionTuning::default());
        session.configure(request()).unwrap();

        assert!(session.submit_encoded(&frame(0)).is_err());
        session.begin_recovery();
        assert_eq!(session.state(), SessionState::Recovering);
        session.complete_recovery(None).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        // last-known dimensions survive the recovery
        assert_eq!(session.dimensions(), (320, 240));

        let outcome = session.submit_encoded(&frame(1)).unwrap();
        assert_eq!(outcome.rendered, 1);
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn test_failed_recovery_terminates() {
        let factory = ScriptedFactory::new(vec![
            CreatePlan::Succeed {
                fail_inputs: u32::MAX,
            },
            CreatePlan::Fail,
        ]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory, target, None, SessionTuning::default());
        session.configure(request()).unwrap();

        assert!(session.submit_encoded(&frame(0)).is_err());
        session.begin_recovery();
        assert!(session.complete_recovery(None).is_err());
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.complete_recovery(None).is_err());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let factory = ScriptedFactory::new(vec![CreatePlan::Succeed { fail_inputs: 0 }]);
        let target = CollectTarget::new();
        let mut session =
            DecoderSession::new(factory.clone(), target, None, SessionTuning::default());
        session.configure(request()).unwrap();

        session.dispose();
        session.dispose();
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(factory.live(), 0);
        assert!(matches!(
            session.submit_encoded(&frame(0)),
            Err(DecodeError::Disposed)
        ));
    }
}
