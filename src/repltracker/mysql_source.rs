//! Replica status source backed by a MySQL connection

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::BackendConnection;
use crate::config::ReplicaConfig;
use crate::protocol::ResultSet;

use super::status::{ReplicaStatus, ReplicaStatusSource, SourceError};

/// Reads replication status with `SHOW SLAVE STATUS` (or the configured query)
///
/// Keeps one connection open between calls and reconnects once per call
/// when that connection has gone away.
pub struct MysqlStatusSource {
    config: ReplicaConfig,
    conn: Mutex<Option<BackendConnection>>,
}

impl MysqlStatusSource {
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Run the status query, on the cached connection if there is one.
    ///
    /// The connection is out of `conn` while a query is in flight, so a
    /// call dropped mid-response never leaves unread packets behind.
    async fn query_status(
        &self,
        conn: &mut Option<BackendConnection>,
    ) -> Result<ResultSet, SourceError> {
        let addr = self.config.addr();

        if let Some(mut c) = conn.take().filter(|c| c.is_usable()) {
            match c.query(&self.config.status_query).await {
                Ok(rs) => {
                    *conn = Some(c);
                    return Ok(rs);
                }
                Err(e) if e.is_recoverable() => {
                    *conn = Some(c);
                    return Err(e.into());
                }
                Err(e) => {
                    debug!(addr = %addr, error = %e, "Cached connection failed, reconnecting");
                }
            }
        }

        let mut new_conn = BackendConnection::connect(&self.config).await?;
        info!(
            addr = %addr,
            server_version = %new_conn.server_version(),
            "Connected to replica"
        );

        let result = new_conn.query(&self.config.status_query).await;
        if result.is_ok() || new_conn.is_usable() {
            *conn = Some(new_conn);
        }
        result.map_err(SourceError::from)
    }
}

#[async_trait]
impl ReplicaStatusSource for MysqlStatusSource {
    async fn replication_status(&self) -> Result<ReplicaStatus, SourceError> {
        let timeout = self.config.connect_timeout();
        let mut conn = self.conn.lock().await;

        let rs = match tokio::time::timeout(timeout, self.query_status(&mut conn)).await {
            Ok(result) => result?,
            Err(_) => {
                // A half-read response would poison the stream
                *conn = None;
                return Err(SourceError::Timeout(timeout));
            }
        };

        ReplicaStatus::from_result_set(&rs)
    }
}
