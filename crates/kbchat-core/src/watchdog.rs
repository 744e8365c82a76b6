//! Stall detection for in-flight transfers.
//!
//! The read loop can block indefinitely awaiting the next chunk, so the
//! watchdog runs on its own periodic timer and signals out of band. It
//! never touches conversation state; the consumer reacts to its signals.
//!
//! Two tiers: an advisory warning after `warning` of silence (one-shot,
//! never reverted; recovery shows up as tokens resuming), and a hard
//! abort after `abort`, which asks the consumer to cancel the read. The
//! warning tier can be disabled entirely by deployments that prefer a
//! single hard timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Watchdog thresholds. Both are configuration, not constants.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Idle time before the advisory warning; None disables the warning tier
    pub warning: Option<Duration>,
    /// Idle time before the transfer is aborted
    pub abort: Duration,
    /// How often idle time is re-checked
    pub poll_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            warning: Some(Duration::from_secs(5 * 60)),
            abort: Duration::from_secs(20 * 60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Signal raised by the watchdog task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSignal {
    /// Idle past the warning threshold; transfer continues
    Warned { idle_secs: u64 },
    /// Idle past the abort threshold; the read loop must cancel
    Aborted { idle_secs: u64 },
}

/// Shared last-activity timestamp; the read loop touches it per chunk.
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    last_activity: Arc<Mutex<Instant>>,
}

impl ActivityHandle {
    fn new() -> Self {
        Self {
            last_activity: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record activity, resetting the idle clock.
    pub fn touch(&self) {
        let mut last = self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    fn idle(&self) -> Duration {
        let last = self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }
}

/// A running watchdog bound to one transfer.
///
/// Dropping the watchdog aborts its timer task, so a new stream for the
/// same conversation never races a stale watchdog.
pub struct Watchdog {
    activity: ActivityHandle,
    signals: mpsc::Receiver<WatchdogSignal>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Start the watchdog timer for a new transfer.
    pub fn spawn(config: WatchdogConfig) -> Self {
        let activity = ActivityHandle::new();
        let (tx, rx) = mpsc::channel(2);

        let handle = activity.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.poll_interval);
            // The first tick completes immediately; skip it
            interval.tick().await;

            let mut warned = false;
            loop {
                interval.tick().await;
                let idle = handle.idle();

                if idle >= config.abort {
                    tracing::warn!(
                        target: "kbchat::watchdog",
                        "Transfer idle for {}s, aborting",
                        idle.as_secs()
                    );
                    let _ = tx
                        .send(WatchdogSignal::Aborted {
                            idle_secs: idle.as_secs(),
                        })
                        .await;
                    return;
                }

                if !warned {
                    if let Some(warning) = config.warning {
                        if idle >= warning {
                            tracing::warn!(
                                target: "kbchat::watchdog",
                                "Transfer idle for {}s, still waiting",
                                idle.as_secs()
                            );
                            warned = true;
                            let _ = tx
                                .send(WatchdogSignal::Warned {
                                    idle_secs: idle.as_secs(),
                                })
                                .await;
                        }
                    }
                }
            }
        });

        Self {
            activity,
            signals: rx,
            task,
        }
    }

    /// Handle for the read loop to reset the idle clock.
    pub fn activity(&self) -> ActivityHandle {
        self.activity.clone()
    }

    /// Receive the next signal. Pending forever once the task has aborted
    /// the transfer and exited, so this is safe to poll in a select loop.
    pub async fn recv(&mut self) -> WatchdogSignal {
        match self.signals.recv().await {
            Some(signal) => signal,
            None => std::future::pending().await,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(warning_secs: Option<u64>, abort_secs: u64) -> WatchdogConfig {
        WatchdogConfig {
            warning: warning_secs.map(Duration::from_secs),
            abort: Duration::from_secs(abort_secs),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_then_no_abort_within_threshold() {
        let mut watchdog = Watchdog::spawn(quick_config(Some(5), 20));

        // Silence past the warning threshold only
        tokio::time::advance(Duration::from_secs(6)).await;
        match watchdog.recv().await {
            WatchdogSignal::Warned { idle_secs } => assert!(idle_secs >= 5),
            other => panic!("expected warning, got {:?}", other),
        }

        // No second signal yet
        tokio::time::advance(Duration::from_secs(5)).await;
        let pending = tokio::time::timeout(Duration::from_secs(1), watchdog.recv()).await;
        assert!(pending.is_err(), "no abort expected below the threshold");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_after_threshold() {
        let mut watchdog = Watchdog::spawn(quick_config(Some(5), 20));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(
            watchdog.recv().await,
            WatchdogSignal::Warned { .. }
        ));

        tokio::time::advance(Duration::from_secs(15)).await;
        match watchdog.recv().await {
            WatchdogSignal::Aborted { idle_secs } => assert!(idle_secs >= 20),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_disabled_goes_straight_to_abort() {
        let mut watchdog = Watchdog::spawn(quick_config(None, 5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(
            watchdog.recv().await,
            WatchdogSignal::Aborted { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_idle_clock() {
        let mut watchdog = Watchdog::spawn(quick_config(Some(5), 20));
        let activity = watchdog.activity();

        // Keep touching before the warning threshold
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(3)).await;
            activity.touch();
        }

        let pending = tokio::time::timeout(Duration::from_secs(1), watchdog.recv()).await;
        assert!(pending.is_err(), "activity should suppress the warning");
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_fires_only_once() {
        let mut watchdog = Watchdog::spawn(quick_config(Some(2), 60));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(
            watchdog.recv().await,
            WatchdogSignal::Warned { .. }
        ));

        // More silence below the abort threshold: no further warnings
        tokio::time::advance(Duration::from_secs(10)).await;
        let pending = tokio::time::timeout(Duration::from_secs(1), watchdog.recv()).await;
        assert!(pending.is_err());
    }
}
