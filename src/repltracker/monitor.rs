//! Background lag polling
//!
//! Calls [`LagTracker::status`] on a fixed interval so the lag gauge stays
//! fresh even when nothing else asks for the lag, and logs when the outcome
//! changes.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::metrics::Metrics;

use super::poller::{LagError, LagTracker};

/// Result of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Lag measured or extrapolated
    Lag(Duration),
    /// No observation yet and replication is not running
    Unavailable,
    /// Status source failed
    Failed(String),
    /// Poll exceeded the configured timeout
    TimedOut,
}

impl PollOutcome {
    /// Label used for the `result` dimension of the poll counter
    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Lag(_) => "ok",
            PollOutcome::Unavailable => "unavailable",
            PollOutcome::Failed(_) => "error",
            PollOutcome::TimedOut => "timeout",
        }
    }
}

/// Polls a [`LagTracker`] until cancelled
pub struct LagMonitor {
    tracker: Arc<LagTracker>,
    metrics: Arc<Metrics>,
    config: PollerConfig,
}

impl LagMonitor {
    pub fn new(tracker: Arc<LagTracker>, metrics: Arc<Metrics>, config: PollerConfig) -> Self {
        Self {
            tracker,
            metrics,
            config,
        }
    }

    /// Spawn the polling task
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        if !self.config.enabled {
            info!("Lag polling is disabled");
            return tokio::spawn(async move {
                shutdown.cancelled().await;
            });
        }

        let interval = self.config.poll_interval();
        info!(
            interval_ms = self.config.poll_interval_ms,
            timeout_ms = self.config.poll_timeout_ms,
            "Lag monitor started"
        );

        tokio::spawn(async move {
            if self.config.stagger_start {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(stagger_delay(interval)) => {}
                }
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_label: Option<&'static str> = None;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Lag monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = self.poll_once().await;
                        self.report(&outcome, last_label);
                        last_label = Some(outcome.label());
                    }
                }
            }
        })
    }

    /// Poll the tracker once, bounded by the configured timeout
    pub async fn poll_once(&self) -> PollOutcome {
        let outcome =
            match tokio::time::timeout(self.config.poll_timeout(), self.tracker.status()).await {
                Ok(Ok(lag)) => PollOutcome::Lag(lag),
                Ok(Err(LagError::Unavailable(_))) => PollOutcome::Unavailable,
                Ok(Err(LagError::Source(e))) => PollOutcome::Failed(e.to_string()),
                Err(_) => PollOutcome::TimedOut,
            };
        self.metrics.record_lag_poll(outcome.label());
        outcome
    }

    fn report(&self, outcome: &PollOutcome, last_label: Option<&'static str>) {
        let changed = last_label != Some(outcome.label());

        match outcome {
            PollOutcome::Lag(lag) if *lag >= self.config.lag_warning() => {
                warn!(lag_secs = lag.as_secs(), "Replication lag above warning threshold");
            }
            PollOutcome::Lag(lag) if changed => {
                info!(lag_secs = lag.as_secs(), "Replication lag available");
            }
            PollOutcome::Lag(lag) => {
                debug!(lag_secs = lag.as_secs(), "Replication lag polled");
            }
            PollOutcome::Unavailable if changed => {
                warn!("Replication lag unavailable: replication is not running");
            }
            PollOutcome::Failed(error) if changed => {
                warn!(error = %error, "Replication status query failed");
            }
            PollOutcome::TimedOut if changed => {
                warn!(
                    timeout_ms = self.config.poll_timeout_ms,
                    "Replication lag poll timed out"
                );
            }
            other => {
                debug!(result = other.label(), "Replication lag poll repeated");
            }
        }
    }
}

/// Random delay in `[0, interval)` so replicas are not polled in lockstep
fn stagger_delay(interval: Duration) -> Duration {
    let upper = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(0..upper))
}
