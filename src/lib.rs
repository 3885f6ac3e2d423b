//! repltrack: replication lag tracking for MySQL replicas

pub mod backend;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod repltracker;
