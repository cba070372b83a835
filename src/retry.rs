//! Failure retry and status reporting
//!
//! A file whose notification failed is not dispatched again until its
//! modification time changes. [`StatusTask`] bounds that: once the retry
//! window has elapsed since the last clear, every failure record is dropped
//! and the next pass dispatches those files again. The same tick logs what
//! is in flight and what has failed.

use crate::detector::ChangeDetector;
use crate::schedule::PeriodicTask;
use crate::types::StatusReport;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Periodic retry clearing and diagnostics for one detector
#[derive(Debug)]
pub struct StatusTask {
    detector: ChangeDetector,
    retry_window: Option<Duration>,
    last_retry_clear: Mutex<Instant>,
}

impl StatusTask {
    /// Create a task using the detector's configured retry window
    pub fn new(detector: ChangeDetector) -> Self {
        let retry_window = detector.config().retry_window();
        Self::with_window(detector, retry_window)
    }

    /// Create a task with an explicit retry window (`None` disables clearing)
    pub fn with_window(detector: ChangeDetector, retry_window: Option<Duration>) -> Self {
        Self {
            detector,
            retry_window,
            last_retry_clear: Mutex::new(Instant::now()),
        }
    }

    /// Run one tick now
    pub fn tick(&self) -> StatusReport {
        self.tick_at(Instant::now())
    }

    /// Run one tick as if the current time were `now`
    pub fn tick_at(&self, now: Instant) -> StatusReport {
        let mut retry_cleared = false;
        if let Some(window) = self.retry_window {
            let mut last = self.last_retry_clear.lock();
            if now.saturating_duration_since(*last) >= window {
                let cleared = self.detector.clear_failures();
                if cleared > 0 {
                    info!("Retry window elapsed, cleared {} failure records", cleared);
                }
                *last = now;
                retry_cleared = true;
            }
        }

        let report = StatusReport {
            taken_at: Utc::now(),
            in_flight: self.detector.in_flight(),
            failed: self.detector.failed(),
            retry_cleared,
        };
        debug!(
            "{}: {} in flight, {} failed",
            self.detector.root_identity(),
            report.in_flight.len(),
            report.failed.len()
        );
        for identity in &report.in_flight {
            trace!("In flight: {}", identity);
        }
        for identity in &report.failed {
            trace!("Failed: {}", identity);
        }
        report
    }

    /// Run ticks on the detector's configured status interval
    pub fn spawn(self) -> PeriodicTask {
        let config = self.detector.config().clone();
        let name = format!("status {}", self.detector.root_identity());
        let task = Arc::new(self);
        PeriodicTask::spawn(name, config.initial_delay(), config.status_interval(), move || {
            let task = Arc::clone(&task);
            async move {
                task.tick();
            }
        })
    }
}
