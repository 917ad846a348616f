//! Health metrics and the watchdog monitor
//!
//! `PipelineHealth` is a set of atomic counters shared by the producer path,
//! the decode worker, and the monitor task. The monitor itself only reads
//! and notifies; it never mutates decoder state, so recovery decisions stay
//! on the worker thread.

use crate::events::{EventSender, PipelineEvent};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn unix_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Health metrics for a pipeline
///
/// All fields use atomic operations for thread-safe access from the
/// producer, worker, and monitor contexts.
pub struct PipelineHealth {
    /// Number of frames rejected by the full queue
    frame_drops: AtomicU64,

    /// Number of decode failures
    decode_failures: AtomicU64,

    /// Timestamp (Unix microseconds) of the last frame arrival
    last_frame_arrival: AtomicU64,

    /// Number of frames accepted from the producer
    frames_received: AtomicU64,

    /// Number of frames successfully decoded
    frames_decoded: AtomicU64,

    /// Total encoded bytes received
    bytes_received: AtomicU64,

    /// Number of arriving frames carrying an IDR slice or parameter sets
    keyframes_received: AtomicU64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            frame_drops: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            last_frame_arrival: AtomicU64::new(unix_micros()),
            frames_received: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            keyframes_received: AtomicU64::new(0),
        }
    }

    /// Record a frame arriving at the pipeline boundary
    pub fn record_arrival(&self, size: usize, is_keyframe: bool) {
        self.last_frame_arrival
            .store(unix_micros(), Ordering::Relaxed);
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(size as u64, Ordering::Relaxed);
        if is_keyframe {
            self.keyframes_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a frame rejected by the full queue
    pub fn record_frame_drop(&self) {
        self.frame_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decode failure
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully decoded frame
    pub fn record_decoded(&self, _size: usize) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_drops(&self) -> u64 {
        self.frame_drops.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn keyframes_received(&self) -> u64 {
        self.keyframes_received.load(Ordering::Relaxed)
    }

    /// Time since the last frame arrived
    pub fn time_since_last_arrival(&self) -> Duration {
        let last = self.last_frame_arrival.load(Ordering::Relaxed);
        Duration::from_micros(unix_micros().saturating_sub(last))
    }

    /// Check whether the stream is stale (no arrivals for `threshold`)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        self.time_since_last_arrival() > threshold
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_received: self.frames_received(),
            frames_decoded: self.frames_decoded(),
            frame_drops: self.frame_drops(),
            decode_failures: self.decode_failures(),
            bytes_received: self.bytes_received(),
            keyframes_received: self.keyframes_received(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub frame_drops: u64,
    pub decode_failures: u64,
    pub bytes_received: u64,
    pub keyframes_received: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} received / {} decoded ({} drops, {} failures), {} bytes, {} keyframes",
            self.frames_received,
            self.frames_decoded,
            self.frame_drops,
            self.decode_failures,
            self.bytes_received,
            self.keyframes_received
        )
    }
}

/// Periodic watchdog over frame arrival recency and decode failures.
///
/// Emits advisory [`PipelineEvent::Stalled`] reports while the stream is
/// stale (one per tick) and [`PipelineEvent::RepeatedFailures`] escalations
/// when the failure counter grows past the alert threshold. Starting twice
/// is a no-op; stopping cancels the task exactly once.
pub struct HealthMonitor {
    health: Arc<PipelineHealth>,
    events: EventSender,
    check_interval: Duration,
    stall_threshold: Duration,
    failure_alert_threshold: u64,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl HealthMonitor {
    pub fn new(health: Arc<PipelineHealth>, events: EventSender) -> Self {
        Self {
            health,
            events,
            check_interval: Duration::from_secs(3),
            stall_threshold: Duration::from_secs(5),
            failure_alert_threshold: 3,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Configure the repeated-failure alert threshold
    pub fn with_failure_threshold(mut self, threshold: u64) -> Self {
        self.failure_alert_threshold = threshold;
        self
    }

    /// Spawn the watchdog task. Needs a tokio runtime; without one the
    /// watchdog stays disabled and a later call within a runtime can still
    /// start it. Repeated successful calls are no-ops.
    pub fn start(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("HealthMonitor: no tokio runtime, watchdog disabled");
            return;
        };
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let health = self.health.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let check_interval = self.check_interval;
        let stall_threshold = self.stall_threshold;
        let failure_alert_threshold = self.failure_alert_threshold;

        handle.spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            let mut last_alerted_failures = 0u64;
            info!("HealthMonitor: started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if health.is_stalled(stall_threshold) {
                    let seconds = health.time_since_last_arrival().as_secs();
                    warn!("HealthMonitor: no frames for {}s", seconds);
                    let _ = events.send(PipelineEvent::Stalled {
                        seconds_since_last_frame: seconds,
                    });
                }

                let failures = health.decode_failures();
                if failures.saturating_sub(last_alerted_failures) >= failure_alert_threshold {
                    let count = failures - last_alerted_failures;
                    warn!("HealthMonitor: {} new decode failures", count);
                    let _ = events.send(PipelineEvent::RepeatedFailures { count });
                    last_alerted_failures = failures;
                }
            }

            info!("HealthMonitor: stopped");
        });
    }

    /// Cancel the watchdog task; idempotent
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[test]
    fn test_health_metrics() {
        let health = PipelineHealth::new();

        health.record_arrival(1000, false);
        health.record_arrival(2000, true);
        health.record_arrival(1500, false);
        health.record_decoded(1000);

        assert_eq!(health.frames_received(), 3);
        assert_eq!(health.bytes_received(), 4500);
        assert_eq!(health.keyframes_received(), 1);
        assert_eq!(health.frames_decoded(), 1);
        assert_eq!(health.frame_drops(), 0);

        health.record_frame_drop();
        health.record_frame_drop();
        assert_eq!(health.frame_drops(), 2);
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();
        assert!(!health.is_stalled(Duration::from_secs(1)));

        health.record_arrival(1000, false);
        std::thread::sleep(Duration::from_millis(150));
        assert!(health.is_stalled(Duration::from_millis(100)));
        assert!(!health.is_stalled(Duration::from_secs(5)));
    }

    #[test]
    fn test_start_without_runtime_is_inert() {
        let health = Arc::new(PipelineHealth::new());
        let (tx, mut rx) = events::channel();
        let monitor = HealthMonitor::new(health, tx)
            .with_check_interval(Duration::from_millis(10))
            .with_stall_threshold(Duration::from_millis(10));

        // No tokio runtime here: start must degrade, not panic
        monitor.start();
        monitor.stop();
        std::thread::sleep(Duration::from_millis(40));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stall_events_until_frame_arrives() {
        let health = Arc::new(PipelineHealth::new());
        let (tx, mut rx) = events::channel();
        let monitor = HealthMonitor::new(health.clone(), tx)
            .with_check_interval(Duration::from_millis(30))
            .with_stall_threshold(Duration::from_millis(100));
        monitor.start();

        tokio::time::sleep(Duration::from_millis(250)).await;
        let mut stalled = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::Stalled { .. }) {
                stalled += 1;
            }
        }
        assert!(stalled >= 1, "expected at least one stall report");

        // A fresh arrival silences the watchdog while within the threshold
        health.record_arrival(100, false);
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());

        monitor.stop();
    }

    #[tokio::test]
    async fn test_repeated_failures_escalation() {
        let health = Arc::new(PipelineHealth::new());
        let (tx, mut rx) = events::channel();
        let monitor = HealthMonitor::new(health.clone(), tx)
            .with_check_interval(Duration::from_millis(20))
            .with_stall_threshold(Duration::from_secs(60))
            .with_failure_threshold(3);
        monitor.start();

        health.record_decode_failure();
        health.record_decode_failure();
        health.record_decode_failure();
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop();

        let mut escalations = 0;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::RepeatedFailures { count } = event {
                assert_eq!(count, 3);
                escalations += 1;
            }
        }
        assert_eq!(escalations, 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let health = Arc::new(PipelineHealth::new());
        let (tx, mut rx) = events::channel();
        let monitor = HealthMonitor::new(health.clone(), tx)
            .with_check_interval(Duration::from_millis(20))
            .with_stall_threshold(Duration::from_millis(10));
        monitor.start();
        monitor.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop();
        monitor.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        while rx.try_recv().is_ok() {}

        // Monitor is cancelled; no further events arrive
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
