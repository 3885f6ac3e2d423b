//! Replication lag tracker
//!
//! Queries the bound status source and remembers the last real lag reading.
//! When the source cannot report a lag (replication stopped, or the server
//! has not computed `Seconds_Behind_Master` yet while reconnecting), the
//! tracker answers with the last reading plus the time elapsed since it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::GaugeSink;

use super::status::{ReplicaStatusSource, SourceError};

/// Gauge holding the last observed lag in whole seconds
pub const REPLICATION_LAG_GAUGE: &str = "replication_lag_sec";

/// Error returned by [`LagTracker::status`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LagError {
    /// Nothing to report yet; callers should retry later
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// The status source failed; passed through as-is
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl LagError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LagError::Unavailable(_))
    }
}

struct TrackerState {
    source: Arc<dyn ReplicaStatusSource>,
    /// Last real lag reading
    lag: Duration,
    /// When `lag` was read; `None` until the first reading
    recorded_at: Option<Instant>,
}

/// Tracks replication lag of one replica
pub struct LagTracker {
    state: Mutex<TrackerState>,
    gauges: Arc<dyn GaugeSink>,
}

impl LagTracker {
    pub fn new(source: Arc<dyn ReplicaStatusSource>, gauges: Arc<dyn GaugeSink>) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                source,
                lag: Duration::ZERO,
                recorded_at: None,
            }),
            gauges,
        }
    }

    /// Rebind the status source.
    ///
    /// Waits for an in-flight [`status`](Self::status) call to finish. The
    /// last reading is kept, so a later outage still extrapolates from it.
    pub async fn set_source(&self, source: Arc<dyn ReplicaStatusSource>) {
        let mut state = self.state.lock().await;
        state.source = source;
    }

    /// Current replication lag, measured or estimated.
    ///
    /// Calls are serialized, including the query to the status source, so a
    /// slow source delays every caller.
    pub async fn status(&self) -> Result<Duration, LagError> {
        let mut state = self.state.lock().await;

        let status = state.source.replication_status().await?;

        let lag = match status.lag() {
            Some(lag) if status.replication_running() => lag,
            _ => {
                let Some(recorded_at) = state.recorded_at else {
                    return Err(LagError::Unavailable("replication is not running".into()));
                };
                let estimate = recorded_at.elapsed() + state.lag;
                debug!(
                    last_lag_secs = state.lag.as_secs(),
                    estimate_secs = estimate.as_secs(),
                    io_state = ?status.io_state,
                    sql_state = ?status.sql_state,
                    "Replication lag unknown, extrapolating"
                );
                return Ok(estimate);
            }
        };

        state.lag = lag;
        state.recorded_at = Some(Instant::now());
        self.gauges
            .set(REPLICATION_LAG_GAUGE, i64::try_from(lag.as_secs()).unwrap_or(i64::MAX));
        Ok(lag)
    }
}
