//! Prometheus metrics for repltrack
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use tracing::warn;

/// Prefix applied to every metric name
pub const NAMESPACE: &str = "repltrack";

/// Sink for named integer gauges
///
/// Kept as a trait so the lag tracker can be exercised without a registry.
pub trait GaugeSink: Send + Sync {
    fn set(&self, name: &str, value: i64);
}

/// repltrack metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Lag polls by outcome (ok, unavailable, error, timeout)
    pub lag_polls_total: IntCounterVec,

    /// Gauges published through `GaugeSink`, keyed by unprefixed name
    gauges: RwLock<HashMap<String, IntGauge>>,

    /// Gauge names that failed to register; not retried
    rejected: RwLock<HashSet<String>>,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let lag_polls_total = IntCounterVec::new(
            Opts::new("lag_polls_total", "Total number of lag polls by result").namespace(NAMESPACE),
            &["result"],
        )
        .expect("static metric definition is valid");

        registry
            .register(Box::new(lag_polls_total.clone()))
            .expect("metric registered once");

        let metrics = Self {
            registry,
            lag_polls_total,
            gauges: RwLock::new(HashMap::new()),
            rejected: RwLock::new(HashSet::new()),
        };
        metrics.describe_gauge(
            crate::repltracker::REPLICATION_LAG_GAUGE,
            "Replication lag in seconds, last real observation",
        );
        metrics
    }

    /// Register a gauge up front so it is exported before its first update
    pub fn describe_gauge(&self, name: &str, help: &str) -> Option<IntGauge> {
        if let Some(existing) = self.gauges.read().get(name) {
            return Some(existing.clone());
        }

        if self.rejected.read().contains(name) {
            return None;
        }

        let mut gauges = self.gauges.write();
        if let Some(existing) = gauges.get(name) {
            return Some(existing.clone());
        }

        let gauge = match IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)) {
            Ok(g) => g,
            Err(e) => {
                warn!(gauge = %name, error = %e, "Invalid gauge definition");
                self.rejected.write().insert(name.to_string());
                return None;
            }
        };
        if let Err(e) = self.registry.register(Box::new(gauge.clone())) {
            warn!(gauge = %name, error = %e, "Failed to register gauge");
            self.rejected.write().insert(name.to_string());
            return None;
        }
        gauges.insert(name.to_string(), gauge.clone());
        Some(gauge)
    }

    /// Current value of a gauge published through `GaugeSink`
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.gauges.read().get(name).map(|g| g.get())
    }

    /// Record the outcome of a lag poll
    pub fn record_lag_poll(&self, result: &str) {
        self.lag_polls_total.with_label_values(&[result]).inc();
    }

    /// Number of lag polls recorded with `result`
    pub fn lag_polls(&self, result: &str) -> u64 {
        self.lag_polls_total.with_label_values(&[result]).get()
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl GaugeSink for Metrics {
    fn set(&self, name: &str, value: i64) {
        if let Some(gauge) = self.describe_gauge(name, name) {
            gauge.set(value);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
        metrics: Arc<Metrics>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (status, content_type, body) = match req.uri().path() {
            "/metrics" => (
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                metrics.gather(),
            ),
            "/health" => (StatusCode::OK, "text/plain", "OK".to_string()),
            _ => (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(content_type),
        );
        Ok(response)
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, metrics.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
