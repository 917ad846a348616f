//! Outbound pipeline notifications
//!
//! Events are fire-and-forget: they are pushed over an unbounded channel and
//! a closed or saturated receiver never blocks the decode path.

use tokio::sync::mpsc;

/// Sender half used by pipeline internals (worker thread, monitor task).
pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver half handed to the pipeline owner.
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Notification raised by the pipeline towards its owner
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A failure report. `fatal` means the pipeline stopped decoding and must
    /// be rebuilt by the owner; non-fatal errors are informational.
    Error { message: String, fatal: bool },

    /// No frame has arrived for longer than the staleness threshold.
    /// Advisory only; decoder state is untouched.
    Stalled { seconds_since_last_frame: u64 },

    /// The decode-failure counter grew past the alert threshold since the
    /// last escalation.
    RepeatedFailures { count: u64 },

    /// A decoded frame was released to the render target
    FrameRendered { sequence: u64 },
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::Error { message, fatal } => {
                if *fatal {
                    write!(f, "Fatal error: {}", message)
                } else {
                    write!(f, "Error: {}", message)
                }
            }
            PipelineEvent::Stalled {
                seconds_since_last_frame,
            } => {
                write!(f, "No frames for {}s", seconds_since_last_frame)
            }
            PipelineEvent::RepeatedFailures { count } => {
                write!(f, "Repeated decode failures: {}", count)
            }
            PipelineEvent::FrameRendered { sequence } => {
                write!(f, "Frame {} rendered", sequence)
            }
        }
    }
}

/// Create the event channel shared between pipeline internals and the owner
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
