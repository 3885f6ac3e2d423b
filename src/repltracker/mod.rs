//! Replication lag tracking
//!
//! This module provides:
//! - `LagTracker`: last observed lag, extrapolated while replication is down
//! - `MysqlStatusSource`: replica status read over the MySQL protocol
//! - `LagMonitor`: periodic polling that keeps the lag gauge current
//! - `reload_source`: rebinding the tracker from a reloaded config file

mod monitor;
mod mysql_source;
mod poller;
mod reload;
mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use monitor::{LagMonitor, PollOutcome};
pub use mysql_source::MysqlStatusSource;
pub use poller::{LagError, LagTracker, REPLICATION_LAG_GAUGE};
pub use reload::reload_source;
pub use status::{ReplicaStatus, ReplicaStatusSource, SourceError, ThreadState};
