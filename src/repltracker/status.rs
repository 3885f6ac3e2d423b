//! Replica status as reported by a status source

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::ConnectionError;
use crate::protocol::ResultSet;

/// State of one replication thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Thread is stopped
    #[default]
    Stopped,
    /// IO thread is (re)connecting to the source
    Connecting,
    /// Thread is running
    Running,
}

impl ThreadState {
    /// Map a `*_Running` column value
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("yes") => ThreadState::Running,
            Some(v) if v.eq_ignore_ascii_case("connecting") => ThreadState::Connecting,
            _ => ThreadState::Stopped,
        }
    }
}

/// Replication status of a replica at the time of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicaStatus {
    pub io_state: ThreadState,
    pub sql_state: ThreadState,
    /// Seconds behind the source, meaningful only when `lag_unknown` is false
    pub lag_seconds: u32,
    /// The server could not compute the lag (reported as NULL)
    pub lag_unknown: bool,
}

const IO_RUNNING_COLUMNS: [&str; 2] = ["Slave_IO_Running", "Replica_IO_Running"];
const SQL_RUNNING_COLUMNS: [&str; 2] = ["Slave_SQL_Running", "Replica_SQL_Running"];
const LAG_COLUMNS: [&str; 2] = ["Seconds_Behind_Master", "Seconds_Behind_Source"];

impl ReplicaStatus {
    /// Both threads running with a known lag
    pub fn running(lag_seconds: u32) -> Self {
        Self {
            io_state: ThreadState::Running,
            sql_state: ThreadState::Running,
            lag_seconds,
            lag_unknown: false,
        }
    }

    /// Both threads stopped
    pub fn stopped() -> Self {
        Self {
            lag_unknown: true,
            ..Self::default()
        }
    }

    /// Threads running but the server reports no lag value yet
    pub fn lag_unknown() -> Self {
        Self {
            io_state: ThreadState::Connecting,
            sql_state: ThreadState::Running,
            lag_seconds: 0,
            lag_unknown: true,
        }
    }

    /// Replication is running only when both threads are
    pub fn replication_running(&self) -> bool {
        self.io_state == ThreadState::Running && self.sql_state == ThreadState::Running
    }

    /// Reported lag, if the server knows it
    pub fn lag(&self) -> Option<Duration> {
        (!self.lag_unknown).then(|| Duration::from_secs(u64::from(self.lag_seconds)))
    }

    /// Build from the first row of `SHOW SLAVE STATUS` / `SHOW REPLICA STATUS`
    pub fn from_result_set(rs: &ResultSet) -> Result<Self, SourceError> {
        if rs.is_empty() {
            return Err(SourceError::NotReplica);
        }

        let io = lookup(rs, &IO_RUNNING_COLUMNS)?;
        let sql = lookup(rs, &SQL_RUNNING_COLUMNS)?;
        let lag = lookup(rs, &LAG_COLUMNS)?;

        let (lag_seconds, lag_unknown) = match lag {
            None => (0, true),
            Some(raw) => {
                let secs = raw.trim().parse::<u32>().map_err(|_| {
                    SourceError::Parse(format!("invalid replication lag value: {:?}", raw))
                })?;
                (secs, false)
            }
        };

        Ok(Self {
            io_state: ThreadState::from_column(io),
            sql_state: ThreadState::from_column(sql),
            lag_seconds,
            lag_unknown,
        })
    }
}

/// First of `names` present in the status row
fn lookup<'a>(rs: &'a ResultSet, names: &[&str]) -> Result<Option<&'a str>, SourceError> {
    names
        .iter()
        .find_map(|name| rs.value(0, name))
        .ok_or_else(|| SourceError::Parse(format!("missing column {}", names.join("/"))))
}

/// Something that can report the current replication status of a replica
#[async_trait]
pub trait ReplicaStatusSource: Send + Sync {
    async fn replication_status(&self) -> Result<ReplicaStatus, SourceError>;
}

/// Failure to obtain a replication status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Server is not configured as a replica")]
    NotReplica,
    #[error("Status query timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ConnectionError> for SourceError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Query(msg) => SourceError::Query(msg),
            ConnectionError::Protocol(msg) => SourceError::Parse(msg),
            other => SourceError::Connection(other.to_string()),
        }
    }
}
