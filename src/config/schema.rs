use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Replica whose replication status is tracked
    #[serde(default)]
    pub replica: ReplicaConfig,
    /// Background lag polling
    #[serde(default)]
    pub poller: PollerConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Replica Configuration
// ============================================================================

/// Connection settings for the monitored replica
///
/// The user needs the REPLICATION CLIENT privilege and must authenticate
/// with mysql_native_password.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    /// Hostname or IP
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// MySQL username
    #[serde(default = "default_user")]
    pub user: String,
    /// MySQL password
    #[serde(default)]
    pub password: String,
    /// Statement returning the replication status row
    #[serde(default = "default_status_query")]
    pub status_query: String,
    /// Bound on connecting and on each status query (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_status_query() -> String {
    "SHOW SLAVE STATUS".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            status_query: default_status_query(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ReplicaConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ============================================================================
// Poller Configuration
// ============================================================================

/// Lag monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Whether the background monitor runs
    #[serde(default = "default_poller_enabled")]
    pub enabled: bool,
    /// Interval between lag polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound for a single poll (milliseconds)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Lag at or above this many seconds is logged as a warning
    #[serde(default = "default_lag_warning_secs")]
    pub lag_warning_secs: u64,
    /// Delay the first poll by a random fraction of the interval
    #[serde(default = "default_stagger_start")]
    pub stagger_start: bool,
}

fn default_poller_enabled() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_timeout_ms() -> u64 {
    5000
}

fn default_lag_warning_secs() -> u64 {
    30
}

fn default_stagger_start() -> bool {
    true
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: default_poller_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            lag_warning_secs: default_lag_warning_secs(),
            stagger_start: default_stagger_start(),
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn lag_warning(&self) -> Duration {
        Duration::from_secs(self.lag_warning_secs)
    }
}

// ============================================================================
// Metrics Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9104".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_addr(),
        }
    }
}

impl Config {
    /// Reject settings the poller and status source cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.replica.status_query.trim().is_empty() {
            return Err("replica.status_query must not be empty".into());
        }
        if self.replica.connect_timeout_ms == 0 {
            return Err("replica.connect_timeout_ms must be at least 1".into());
        }
        if self.poller.poll_interval_ms == 0 {
            return Err("poller.poll_interval_ms must be at least 1".into());
        }
        if self.poller.poll_timeout_ms == 0 {
            return Err("poller.poll_timeout_ms must be at least 1".into());
        }
        Ok(())
    }
}
