//! Lag tracking against a live replica

use std::sync::Arc;
use std::time::Duration;

use repltrack::metrics::Metrics;
use repltrack::repltracker::{
    LagTracker, MysqlStatusSource, ReplicaStatusSource, ThreadState, REPLICATION_LAG_GAUGE,
};

use crate::{
    admin_conn, replica_config, replication_control, seconds_behind_master, skip_if_not_enabled,
    start_replication, stop_replication,
};

/// Poll until replication reports a lag value again
async fn wait_for_running(source: &MysqlStatusSource) {
    for _ in 0..50 {
        if let Ok(status) = source.replication_status().await {
            if status.replication_running() && !status.lag_unknown {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("replication did not come back within 10s");
}

#[tokio::test]
async fn test_status_source_reads_running_replica() {
    skip_if_not_enabled!();
    let _control = replication_control();

    let mut admin = admin_conn();
    start_replication(&mut admin);

    let source = MysqlStatusSource::new(replica_config());
    wait_for_running(&source).await;

    let status = source.replication_status().await.expect("status query should succeed");
    assert_eq!(status.io_state, ThreadState::Running);
    assert_eq!(status.sql_state, ThreadState::Running);

    let reported = seconds_behind_master(&mut admin).expect("lag should be known");
    // both reads happen within a second or two of each other
    assert!(u64::from(status.lag_seconds).abs_diff(reported) <= 2);
}

#[tokio::test]
async fn test_tracker_publishes_observed_lag() {
    skip_if_not_enabled!();
    let _control = replication_control();

    let mut admin = admin_conn();
    start_replication(&mut admin);

    let source = Arc::new(MysqlStatusSource::new(replica_config()));
    wait_for_running(&source).await;

    let metrics = Arc::new(Metrics::new());
    let tracker = LagTracker::new(source, metrics.clone());

    let lag = tracker.status().await.expect("lag should be measured");
    assert_eq!(
        metrics.gauge_value(REPLICATION_LAG_GAUGE),
        Some(lag.as_secs() as i64)
    );
}

#[tokio::test]
async fn test_tracker_extrapolates_while_replication_stopped() {
    skip_if_not_enabled!();
    let _control = replication_control();

    let mut admin = admin_conn();
    start_replication(&mut admin);

    let source = Arc::new(MysqlStatusSource::new(replica_config()));
    wait_for_running(&source).await;

    let metrics = Arc::new(Metrics::new());
    let tracker = LagTracker::new(source.clone(), metrics.clone());

    let observed = tracker.status().await.expect("lag should be measured");
    let gauge = metrics.gauge_value(REPLICATION_LAG_GAUGE);

    stop_replication(&mut admin);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let estimate = tracker.status().await.expect("estimate expected while stopped");
    start_replication(&mut admin);

    assert!(
        estimate >= observed + Duration::from_secs(2),
        "estimate {:?} should include the 2s outage on top of {:?}",
        estimate,
        observed
    );
    assert_eq!(metrics.gauge_value(REPLICATION_LAG_GAUGE), gauge);

    wait_for_running(&source).await;
}

#[tokio::test]
async fn test_tracker_unavailable_when_started_during_outage() {
    skip_if_not_enabled!();
    let _control = replication_control();

    let mut admin = admin_conn();
    stop_replication(&mut admin);

    let source = Arc::new(MysqlStatusSource::new(replica_config()));
    let tracker = LagTracker::new(source.clone(), Arc::new(Metrics::new()));
    let result = tracker.status().await;

    start_replication(&mut admin);

    let err = result.expect_err("no observation to extrapolate from");
    assert!(err.is_unavailable(), "unexpected error: {}", err);

    wait_for_running(&source).await;
}
