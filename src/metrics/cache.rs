//! Cache store metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct CacheMetrics;

impl CacheMetrics {
    pub fn record_hit(cache_type: &str) {
        ::metrics::counter!(phase_metric!(counter, "cache", "hits"), "cache_type" => cache_type.to_string())
            .increment(1);
    }

    pub fn record_miss(cache_type: &str) {
        ::metrics::counter!(phase_metric!(counter, "cache", "misses"), "cache_type" => cache_type.to_string())
            .increment(1);
    }

    pub fn record_write_error() {
        ::metrics::counter!(phase_metric!(counter, "cache", "write_errors")).increment(1);
    }

    pub fn record_write_bytes(bytes: usize) {
        ::metrics::histogram!(phase_metric!(histogram, "cache", "entry_bytes")).record(bytes as f64);
    }

    /// Entries removed by a sweep, expired and corrupt alike
    pub fn record_swept(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "cache", "swept_entries")).increment(count as u64);
    }
}

impl PhaseMetrics for CacheMetrics {
    fn register_metrics() {
        use ::metrics::{describe_counter, describe_histogram};

        describe_counter!(phase_metric!(counter, "cache", "hits"), "Cache lookups served from disk");
        describe_counter!(phase_metric!(counter, "cache", "misses"), "Cache lookups that fell through to a fetch");
        describe_counter!(phase_metric!(counter, "cache", "write_errors"), "Cache writes that failed and were skipped");
        describe_counter!(phase_metric!(counter, "cache", "swept_entries"), "Entries deleted by maintenance sweeps");
        describe_histogram!(phase_metric!(histogram, "cache", "entry_bytes"), "Size of written cache entries");
    }

    fn phase_name() -> &'static str {
        "cache"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "cache", "hits"),
                metric_type: MetricType::Counter,
                help: "Cache lookups served from disk",
                labels: vec!["cache_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "cache", "misses"),
                metric_type: MetricType::Counter,
                help: "Cache lookups that fell through to a fetch",
                labels: vec!["cache_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "cache", "write_errors"),
                metric_type: MetricType::Counter,
                help: "Cache writes that failed and were skipped",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "cache", "swept_entries"),
                metric_type: MetricType::Counter,
                help: "Entries deleted by maintenance sweeps",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "cache", "entry_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of written cache entries",
                labels: vec![],
            },
        ]
    }
}
