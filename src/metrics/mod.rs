//! Metrics for cache and vendor-fetch behavior
//!
//! Each area defines its metrics in its own submodule. Recording is a no-op until a
//! recorder is installed, so library users and tests pay nothing; the binary installs
//! a Prometheus exporter when `QA_METRICS_ADDR` is set.

pub mod cache;
pub mod sources;

pub use cache::CacheMetrics;
pub use sources::SourcesMetrics;

use std::collections::HashMap;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

pub const METRICS_ADDR_ENV: &str = "QA_METRICS_ADDR";

/// Install the Prometheus exporter if `QA_METRICS_ADDR` is set. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return,
        };

        let addr = match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}", addr_str, e);
                return;
            }
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", addr);
                register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

/// Trait implemented by each area's metrics collection
pub trait PhaseMetrics {
    /// Describe every metric so it shows up in the exporter before first use
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Consistent naming: qa_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("qa_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("qa_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();
    register_phase_metrics::<CacheMetrics>(&mut all_metrics);
    register_phase_metrics::<SourcesMetrics>(&mut all_metrics);
    info!("Registered {} metrics", all_metrics.len());
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, MetricDoc>) {
    T::register_metrics();
    for doc in T::metrics_documentation() {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict: '{}' registered twice (phase '{}')",
                doc.name,
                T::phase_name()
            );
        } else {
            all_metrics.insert(doc.name, doc);
        }
    }
}
