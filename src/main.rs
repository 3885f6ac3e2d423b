use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use repltrack::config::{self, Config};
use repltrack::metrics::{start_metrics_server, Metrics};
use repltrack::repltracker::{reload_source, LagMonitor, LagTracker, MysqlStatusSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let explicit_path = std::env::args().nth(1);
    let (config, config_path) = load_or_default_config(explicit_path.as_deref());

    let metrics = Arc::new(Metrics::new());

    let source = Arc::new(MysqlStatusSource::new(config.replica.clone()));
    let tracker = Arc::new(LagTracker::new(source, metrics.clone()));

    info!(
        replica = %config.replica.addr(),
        status_query = %config.replica.status_query,
        "Tracking replication lag"
    );

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&addr, metrics).await {
                error!(addr = %addr, error = %e, "Metrics server stopped");
            }
        });
    }

    let shutdown = CancellationToken::new();
    let monitor = Arc::new(LagMonitor::new(
        tracker.clone(),
        metrics.clone(),
        config.poller.clone(),
    ));
    let monitor_handle = monitor.start(shutdown.clone());

    #[cfg(unix)]
    spawn_reload_on_sighup(config_path, tracker, shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    monitor_handle.await?;

    Ok(())
}

/// Rebind the tracker to the `[replica]` section of a reloaded config.
///
/// Only the file loaded at startup is re-read; a failed reload keeps the
/// current replica.
#[cfg(unix)]
fn spawn_reload_on_sighup(
    config_path: Option<String>,
    tracker: Arc<LagTracker>,
    shutdown: CancellationToken,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Cannot install SIGHUP handler, config reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let Some(path) = config_path.as_deref() else {
                        warn!("No configuration file was loaded at startup, nothing to reload");
                        continue;
                    };
                    match reload_source(&tracker, path).await {
                        Ok(replica) => {
                            info!(path = path, replica = %replica.addr(), "Reloaded configuration, rebinding status source");
                        }
                        Err(e) => {
                            warn!(path = path, error = %e, "Config reload failed, keeping current replica");
                        }
                    }
                }
            }
        }
    });
}

/// Returns the config and the file it came from, if any
fn load_or_default_config(explicit: Option<&str>) -> (Config, Option<String>) {
    let config_paths: Vec<&str> = match explicit {
        Some(path) => vec![path],
        None => vec!["config/repltrack.toml", "repltrack.toml"],
    };

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return (config, Some(path.to_string()));
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    (Config::default(), None)
}
