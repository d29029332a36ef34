//! Vendor source metrics
//!
//! Tracks calls that actually reached GA4 or Search Console (cache misses), how long
//! they took, and how many pages a Search Console drain needed.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SourcesMetrics;

impl SourcesMetrics {
    pub fn record_fetch(source: &str, duration_secs: f64, rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "sources", "fetches"), "source" => source.to_string())
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "sources", "fetch_duration_seconds"), "source" => source.to_string())
            .record(duration_secs);
        ::metrics::histogram!(phase_metric!(histogram, "sources", "rows"), "source" => source.to_string())
            .record(rows as f64);
    }

    pub fn record_fetch_error(source: &str) {
        ::metrics::counter!(phase_metric!(counter, "sources", "fetch_errors"), "source" => source.to_string())
            .increment(1);
    }

    pub fn record_pages(pages: u32) {
        ::metrics::histogram!(phase_metric!(histogram, "sources", "pages")).record(pages as f64);
    }
}

impl PhaseMetrics for SourcesMetrics {
    fn register_metrics() {
        use ::metrics::{describe_counter, describe_histogram};

        describe_counter!(phase_metric!(counter, "sources", "fetches"), "Vendor calls made on cache miss");
        describe_counter!(phase_metric!(counter, "sources", "fetch_errors"), "Vendor calls that failed");
        describe_histogram!(phase_metric!(histogram, "sources", "fetch_duration_seconds"), "Vendor call latency");
        describe_histogram!(phase_metric!(histogram, "sources", "rows"), "Rows returned per fetch");
        describe_histogram!(phase_metric!(histogram, "sources", "pages"), "Search Console pages drained per query");
    }

    fn phase_name() -> &'static str {
        "sources"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "sources", "fetches"),
                metric_type: MetricType::Counter,
                help: "Vendor calls made on cache miss",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "fetch_errors"),
                metric_type: MetricType::Counter,
                help: "Vendor calls that failed",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "sources", "fetch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Vendor call latency",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "sources", "rows"),
                metric_type: MetricType::Histogram,
                help: "Rows returned per fetch",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "sources", "pages"),
                metric_type: MetricType::Histogram,
                help: "Search Console pages drained per query",
                labels: vec![],
            },
        ]
    }
}
