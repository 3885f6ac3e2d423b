//! Integration test entry point
//!
//! Run with: REPLTRACK_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Needs a running MySQL replica. The test user must be allowed to run
//! STOP SLAVE / START SLAVE (SUPER or REPLICATION_SLAVE_ADMIN).
//!
//! Environment variables:
//! - REPLTRACK_RUN_INTEGRATION_TESTS: Set to "1" to enable integration tests
//! - REPLTRACK_TEST_REPLICA_HOST: Replica host (default: 127.0.0.1)
//! - REPLTRACK_TEST_REPLICA_PORT: Replica port (default: 3307)
//! - REPLTRACK_TEST_REPLICA_USER: Replica user (default: root)
//! - REPLTRACK_TEST_REPLICA_PASS: Replica password (default: empty)

mod replica;

use std::env;
use std::sync::{Mutex, MutexGuard};

use mysql::prelude::*;
use mysql::{Conn, OptsBuilder};
use repltrack::config::ReplicaConfig;

/// Tests that stop and start replication must not overlap
static REPLICATION_CONTROL: Mutex<()> = Mutex::new(());

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("REPLTRACK_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set REPLTRACK_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Replica connection settings from environment
pub fn replica_config() -> ReplicaConfig {
    ReplicaConfig {
        host: env::var("REPLTRACK_TEST_REPLICA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("REPLTRACK_TEST_REPLICA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3307),
        user: env::var("REPLTRACK_TEST_REPLICA_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("REPLTRACK_TEST_REPLICA_PASS").unwrap_or_default(),
        ..ReplicaConfig::default()
    }
}

/// Plain client connection to the replica for driving replication
pub fn admin_conn() -> Conn {
    let config = replica_config();
    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(config.host))
        .tcp_port(config.port)
        .user(Some(config.user))
        .pass(Some(config.password));
    Conn::new(opts).expect("Failed to connect to replica")
}

/// Exclusive right to stop/start replication for the guard's lifetime
pub fn replication_control() -> MutexGuard<'static, ()> {
    REPLICATION_CONTROL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn stop_replication(conn: &mut Conn) {
    conn.query_drop("STOP SLAVE").expect("STOP SLAVE should succeed");
}

pub fn start_replication(conn: &mut Conn) {
    conn.query_drop("START SLAVE").expect("START SLAVE should succeed");
}

/// Seconds_Behind_Master as the mysql client sees it
pub fn seconds_behind_master(conn: &mut Conn) -> Option<u64> {
    let row: Option<mysql::Row> = conn
        .query_first("SHOW SLAVE STATUS")
        .expect("SHOW SLAVE STATUS should succeed");
    let row = row.expect("test server must be a replica");
    row.get_opt::<Option<u64>, _>("Seconds_Behind_Master")
        .and_then(|v| v.ok())
        .flatten()
}
