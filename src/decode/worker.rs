//! Decode worker loop
//!
//! One dedicated OS thread per active decoder session. The loop blocks on
//! the frame buffer with a short timeout, feeds the session, and owns the
//! consecutive-error recovery policy: past the threshold it tears the
//! decoder down, waits out the recovery delay, and reconfigures in place.
//! If that reconfiguration fails the worker emits one fatal error and stops;
//! the pipeline never dies silently.

use crate::buffer::FrameBuffer;
use crate::decode::session::DecoderSession;
use crate::decode::DecodeError;
use crate::events::{EventSender, PipelineEvent};
use crate::health::PipelineHealth;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Timing and threshold knobs for the worker loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_timeout: Duration,
    pub consecutive_error_limit: u32,
    pub recovery_delay: Duration,
}

/// Handle to a running decode worker thread
pub struct DecodeWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Spawn the worker thread for an already-configured session
    pub fn spawn(
        buffer: Arc<FrameBuffer>,
        session: Arc<Mutex<DecoderSession>>,
        health: Arc<PipelineHealth>,
        events: EventSender,
        config: WorkerConfig,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = std::thread::Builder::new()
            .name("framepipe-decode".into())
            .spawn(move || {
                run_loop(buffer, session, health, events, config, stop_flag);
            })
            .expect("failed to spawn decode worker thread");

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// True once the loop exited (fatal recovery failure or shutdown)
    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(true)
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// Bounded: every wait inside the loop carries a timeout, so the thread
    /// observes the flag within one poll interval plus one decode call.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    buffer: Arc<FrameBuffer>,
    session: Arc<Mutex<DecoderSession>>,
    health: Arc<PipelineHealth>,
    events: EventSender,
    config: WorkerConfig,
    stop: Arc<AtomicBool>,
) {
    info!("DecodeWorker: started");
    let mut decoded_frames = 0u64;

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(frame) = buffer.try_take(config.poll_timeout) else {
            continue;
        };
        let sequence = frame.sequence;

        let outcome = session.lock().unwrap().submit_encoded(&frame);
        match outcome {
            Ok(result) => {
                health.record_decoded(frame.size());
                decoded_frames += 1;
                if result.rendered > 0 {
                    let _ = events.send(PipelineEvent::FrameRendered { sequence });
                }
                if !result.queued {
                    debug!("DecodeWorker: input slot timeout for frame {}", sequence);
                }
            }
            Err(DecodeError::Disposed) => {
                debug!("DecodeWorker: session disposed, exiting");
                break;
            }
            Err(err) => {
                health.record_decode_failure();
                warn!("DecodeWorker: decode failed for frame {}: {}", sequence, err);

                let errors = session.lock().unwrap().consecutive_errors();
                if errors < config.consecutive_error_limit {
                    continue;
                }

                let _ = events.send(PipelineEvent::Error {
                    message: format!(
                        "{} consecutive decode errors, attempting recovery",
                        errors
                    ),
                    fatal: false,
                });
                session.lock().unwrap().begin_recovery();

                // The failed decoder needs a moment to release its resources
                // before a new one can bind the same target.
                std::thread::sleep(config.recovery_delay);
                if stop.load(Ordering::Acquire) {
                    break;
                }

                let probe = buffer.peek_payload();
                let recovered = session.lock().unwrap().complete_recovery(probe);
                match recovered {
                    Ok(()) => {
                        info!("DecodeWorker: decoder recovered, resuming");
                    }
                    Err(err) => {
                        error!("DecodeWorker: recovery failed: {:#}", err);
                        let _ = events.send(PipelineEvent::Error {
                            message: format!("decoder recovery failed: {:#}", err),
                            fatal: true,
                        });
                        break;
                    }
                }
            }
        }
    }

    info!("DecodeWorker: stopped ({} frames decoded)", decoded_frames);
}
