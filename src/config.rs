//! Pipeline configuration

use crate::decode::annexb::ParameterSets;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a [`VideoPipeline`](crate::pipeline::VideoPipeline).
///
/// The defaults are the production values; tests tighten the timing knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of queued encoded frames
    pub queue_capacity: usize,

    /// How long the decode worker blocks waiting for a frame per iteration
    pub poll_timeout: Duration,

    /// Bounded wait for decoder input-slot and output-drain operations
    pub io_timeout: Duration,

    /// Consecutive decode errors that trigger an in-place recovery
    pub consecutive_error_limit: u32,

    /// Pause between decoder teardown and the reconfiguration attempt
    pub recovery_delay: Duration,

    /// Health monitor tick interval
    pub check_interval: Duration,

    /// Frame-arrival staleness threshold for the advisory stall report
    pub stall_threshold: Duration,

    /// New decode failures since the last escalation that trigger a
    /// repeated-failures notification
    pub failure_alert_threshold: u64,

    /// Dimensions assumed until the host reports real ones
    pub default_width: u32,
    pub default_height: u32,

    /// Dimensions used for a recovery reconfiguration when no usable
    /// dimensions are known
    pub recovery_width: u32,
    pub recovery_height: u32,

    /// Out-of-band decoder parameter sets. When absent, the first buffered
    /// frame is scanned and the hardcoded defaults are the last resort.
    pub parameter_sets: Option<ParameterSets>,

    /// Where the software-player backend materializes received bytes
    pub spool_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 30,
            poll_timeout: Duration::from_millis(100),
            io_timeout: Duration::from_millis(10),
            consecutive_error_limit: 5,
            recovery_delay: Duration::from_secs(1),
            check_interval: Duration::from_secs(3),
            stall_threshold: Duration::from_secs(5),
            failure_alert_threshold: 3,
            default_width: 1280,
            default_height: 720,
            recovery_width: 640,
            recovery_height: 480,
            parameter_sets: None,
            spool_dir: std::env::temp_dir(),
        }
    }
}

impl PipelineConfig {
    /// Configure the frame queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Configure the worker's per-iteration wait on the frame queue
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Configure the bounded decoder input/output wait
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Configure the consecutive-error recovery threshold
    pub fn with_error_limit(mut self, limit: u32) -> Self {
        self.consecutive_error_limit = limit;
        self
    }

    /// Configure the teardown-to-reconfigure recovery pause
    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Configure the health monitor tick interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the staleness threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Configure the dimensions assumed before the host reports real ones
    pub fn with_default_dimensions(mut self, width: u32, height: u32) -> Self {
        self.default_width = width;
        self.default_height = height;
        self
    }

    /// Supply out-of-band decoder parameter sets
    pub fn with_parameter_sets(mut self, sets: ParameterSets) -> Self {
        self.parameter_sets = Some(sets);
        self
    }

    /// Configure the software-player spool directory
    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = dir;
        self
    }
}
