//! Periodic tasks on the tokio runtime
//!
//! Polling and the status/retry tick both run as a [`PeriodicTask`]: a tokio
//! task driven by `interval_at` with an initial delay, stopped through a
//! oneshot channel. Missed ticks are delayed rather than bursted, so a slow
//! pass never causes a backlog of polls.

use crate::detector::ChangeDetector;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// A stoppable task that runs a closure on a fixed interval
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a task that awaits `tick()` every `period`, starting after
    /// `initial_delay`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: impl Into<String>, initial_delay: Duration, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + initial_delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Task {} started (every {:?})", task_name, period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        trace!("Task {} tick", task_name);
                        tick().await;
                    }
                }
            }
            debug!("Task {} stopped", task_name);
        });

        Self {
            name,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Name given at spawn time
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for the current tick to finish
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!("Task {} ended abnormally: {}", self.name, e);
        }
    }
}

/// Poll `detector` on its configured interval
///
/// Each poll runs on the blocking pool, since listing and listener callbacks
/// may do blocking I/O.
pub fn spawn_poller(detector: ChangeDetector) -> PeriodicTask {
    let config = detector.config().clone();
    let name = format!("poll {}", detector.root_identity());
    PeriodicTask::spawn(name, config.initial_delay(), config.poll_interval(), move || {
        let detector = detector.clone();
        async move {
            match tokio::task::spawn_blocking(move || detector.poll()).await {
                Ok(ran) => trace!("Poll ran: {}", ran),
                Err(e) => warn!("Poll task failed: {}", e),
            }
        }
    })
}
