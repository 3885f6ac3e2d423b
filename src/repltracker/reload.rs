//! Rebinding the tracker after a configuration change

use std::path::Path;
use std::sync::Arc;

use crate::config::{self, ConfigError, ReplicaConfig};

use super::mysql_source::MysqlStatusSource;
use super::poller::LagTracker;

/// Load `path` and point `tracker` at its `[replica]` section.
///
/// A file that cannot be read, parsed or validated leaves the current
/// source bound and is reported as an error.
pub async fn reload_source(
    tracker: &LagTracker,
    path: impl AsRef<Path>,
) -> Result<ReplicaConfig, ConfigError> {
    let config = config::load_config(path)?;
    tracker
        .set_source(Arc::new(MysqlStatusSource::new(config.replica.clone())))
        .await;
    Ok(config.replica)
}
