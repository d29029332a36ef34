use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::app::ports::{AnalyticsPort, NameRef, RunReportRequest, RunReportResponse};
use crate::cache::CacheStore;
use crate::config::AnalyticsConfig;
use crate::constants::{GA4_HISTORICAL, GA4_RECENT, MAX_LOOKBACK_DAYS};
use crate::error::{AttributionError, Result};
use crate::metrics::SourcesMetrics;
use crate::types::{Account, DateRange, Fetched, MetricRow, MetricValue};

const SOURCE: &str = "ga4";

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9.]+$").expect("numeric pattern compiles"));

/// Parameters for one GA4 report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub date_range: DateRange,
    /// GA4 `FilterExpression`, passed through as-is
    pub filter: Option<Value>,
    pub order_bys: Vec<Value>,
    pub limit: u32,
}

impl ReportOptions {
    pub fn new(dimensions: &[&str], metrics: &[&str], date_range: DateRange, limit: u32) -> Self {
        Self {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            date_range,
            filter: None,
            order_bys: Vec::new(),
            limit,
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, order_by: Value) -> Self {
        self.order_bys.push(order_by);
        self
    }

    pub fn to_request(&self) -> RunReportRequest {
        RunReportRequest {
            date_ranges: vec![self.date_range],
            dimensions: self.dimensions.iter().map(NameRef::new).collect(),
            metrics: self.metrics.iter().map(NameRef::new).collect(),
            dimension_filter: self.filter.clone(),
            order_bys: self.order_bys.clone(),
            limit: self.limit,
        }
    }

    /// Everything that changes the vendor's answer
    fn cache_params(&self, property: &str) -> Value {
        json!({
            "property": property,
            "dateRange": self.date_range,
            "dimensions": self.dimensions,
            "metrics": self.metrics,
            "filter": self.filter,
            "orderBys": self.order_bys,
            "limit": self.limit,
        })
    }
}

/// Exact-match string filter on one dimension
pub fn string_filter(field: &str, value: &str) -> Value {
    json!({
        "filter": {
            "fieldName": field,
            "stringFilter": { "matchType": "EXACT", "value": value }
        }
    })
}

pub fn metric_order_desc(metric: &str) -> Value {
    json!({ "metric": { "metricName": metric }, "desc": true })
}

pub fn dimension_order(dimension: &str) -> Value {
    json!({ "dimension": { "dimensionName": dimension } })
}

/// `[today - days, today]`
pub fn date_range_ending(today: NaiveDate, days: i64) -> Result<DateRange> {
    DateRange::ending_at(today, days)
}

/// Ranges ending inside the recent window may still change upstream and get the short TTL.
pub fn classify_date_range(range: &DateRange, today: NaiveDate, recent_window_days: i64) -> &'static str {
    let window = chrono::Duration::days(recent_window_days.clamp(0, MAX_LOOKBACK_DAYS));
    if today.checked_sub_signed(window).map_or(true, |cutoff| range.end_date >= cutoff) {
        GA4_RECENT
    } else {
        GA4_HISTORICAL
    }
}

/// Flatten a GA4 response into one map per row keyed by header names.
pub fn parse_report(response: &RunReportResponse) -> Vec<MetricRow> {
    response
        .rows
        .iter()
        .map(|row| {
            let mut parsed = MetricRow::default();
            for (header, value) in response.dimension_headers.iter().zip(&row.dimension_values) {
                parsed.insert(header.name.clone(), MetricValue::Text(value.value.clone()));
            }
            for (header, value) in response.metric_headers.iter().zip(&row.metric_values) {
                parsed.insert(header.name.clone(), coerce_metric(&value.value));
            }
            parsed
        })
        .collect()
}

fn coerce_metric(raw: &str) -> MetricValue {
    if NUMERIC.is_match(raw) {
        if let Ok(n) = raw.parse::<f64>() {
            return MetricValue::Number(n);
        }
    }
    MetricValue::Text(raw.to_string())
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Cached GA4 reports for one property.
pub struct AnalyticsAdapter {
    account_id: String,
    property: String,
    cache: CacheStore,
    port: Arc<dyn AnalyticsPort>,
    config: AnalyticsConfig,
    refresh: bool,
}

impl AnalyticsAdapter {
    pub fn new(
        account: &Account,
        cache: CacheStore,
        port: Arc<dyn AnalyticsPort>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            account_id: account.id.clone(),
            property: account.ga4_property.clone(),
            cache,
            port,
            config,
            refresh: false,
        }
    }

    /// Skip cache lookups (results are still written back)
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn date_range(&self, days: i64) -> Result<DateRange> {
        date_range_ending(today(), days)
    }

    pub fn cache_type(&self, range: &DateRange) -> &'static str {
        classify_date_range(range, today(), self.config.recent_window_days)
    }

    #[instrument(skip(self, options), fields(account = %self.account_id, dims = ?options.dimensions))]
    pub async fn run_report(&self, options: ReportOptions) -> Result<Fetched<Vec<MetricRow>>> {
        if options.metrics.is_empty() {
            return Err(AttributionError::Config("a GA4 report needs at least one metric".into()));
        }

        let cache_type = self.cache_type(&options.date_range);
        let params = options.cache_params(&self.property);
        let request = options.to_request();
        let port = Arc::clone(&self.port);
        let property = self.property.clone();

        let fetch = move || async move {
            let started = Instant::now();
            let response = match port.run_report(&property, &request).await {
                Ok(response) => response,
                Err(e) => {
                    SourcesMetrics::record_fetch_error(SOURCE);
                    return Err(e);
                }
            };
            let rows = parse_report(&response);
            SourcesMetrics::record_fetch(SOURCE, started.elapsed().as_secs_f64(), rows.len());
            info!(property = %property, rows = rows.len(), "fetched GA4 report");
            Ok(rows)
        };

        if self.refresh {
            self.cache.refresh(cache_type, params, fetch).await
        } else {
            self.cache.get_or_fetch(cache_type, params, fetch).await
        }
    }

    /// Site-wide totals
    pub async fn overview(&self, days: i64) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &[],
            &[
                "sessions",
                "totalUsers",
                "newUsers",
                "screenPageViews",
                "engagementRate",
                "averageSessionDuration",
                "bounceRate",
                "conversions",
                "purchaseRevenue",
                "transactions",
            ],
            self.date_range(days)?,
            1,
        );
        self.run_report(options).await
    }

    pub async fn landing_pages(&self, days: i64, limit: u32) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["landingPage"],
            &["sessions", "engagementRate", "bounceRate", "conversions", "purchaseRevenue"],
            self.date_range(days)?,
            limit,
        )
        .with_order_by(metric_order_desc("sessions"));
        self.run_report(options).await
    }

    /// Organic-search landing pages with outcome metrics; the attribution input.
    pub async fn organic_landing_pages(&self, days: i64) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["landingPage"],
            &["sessions", "conversions", "purchaseRevenue", "transactions"],
            self.date_range(days)?,
            self.config.row_limit,
        )
        .with_filter(string_filter(
            "sessionDefaultChannelGroup",
            &self.config.organic_channel_group,
        ))
        .with_order_by(metric_order_desc("sessions"));
        self.run_report(options).await
    }

    pub async fn trends(&self, days: i64) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["date"],
            &["sessions", "totalUsers", "conversions", "purchaseRevenue"],
            self.date_range(days)?,
            self.config.row_limit,
        )
        .with_order_by(dimension_order("date"));
        self.run_report(options).await
    }

    pub async fn by_device(&self, days: i64) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["deviceCategory"],
            &["sessions", "engagementRate", "conversions", "purchaseRevenue"],
            self.date_range(days)?,
            self.config.row_limit,
        )
        .with_order_by(metric_order_desc("sessions"));
        self.run_report(options).await
    }

    pub async fn by_geo(&self, days: i64, limit: u32) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["country"],
            &["sessions", "totalUsers", "conversions", "purchaseRevenue"],
            self.date_range(days)?,
            limit,
        )
        .with_order_by(metric_order_desc("sessions"));
        self.run_report(options).await
    }

    pub async fn traffic_sources(&self, days: i64, limit: u32) -> Result<Fetched<Vec<MetricRow>>> {
        let options = ReportOptions::new(
            &["sessionDefaultChannelGroup", "sessionSource"],
            &["sessions", "conversions", "purchaseRevenue"],
            self.date_range(days)?,
            limit,
        )
        .with_order_by(metric_order_desc("sessions"));
        self.run_report(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{ReportRow, ReportValue};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_ending() {
        let range = date_range_ending(date("2024-03-31"), 30).unwrap();
        assert_eq!(range.start_date, date("2024-03-01"));
        assert_eq!(range.end_date, date("2024-03-31"));
    }

    #[test]
    fn test_date_range_ending_rejects_bad_days() {
        assert!(matches!(
            date_range_ending(date("2024-03-31"), -7),
            Err(AttributionError::Config(_))
        ));
        assert!(matches!(
            date_range_ending(date("2024-03-31"), 1_000_000_000),
            Err(AttributionError::Config(_))
        ));
    }

    #[test]
    fn test_classify_date_range() {
        let today = date("2024-03-31");
        let recent = DateRange::new(date("2024-03-01"), date("2024-03-25"));
        let boundary = DateRange::new(date("2024-03-01"), date("2024-03-24"));
        let old = DateRange::new(date("2024-01-01"), date("2024-02-01"));
        assert_eq!(classify_date_range(&recent, today, 7), GA4_RECENT);
        assert_eq!(classify_date_range(&boundary, today, 7), GA4_RECENT);
        assert_eq!(classify_date_range(&old, today, 7), GA4_HISTORICAL);
    }

    #[test]
    fn test_parse_report_coerces_numeric_metrics_only() {
        let response = RunReportResponse {
            dimension_headers: vec![NameRef::new("landingPage")],
            metric_headers: vec![
                NameRef::new("sessions"),
                NameRef::new("purchaseRevenue"),
                NameRef::new("delta"),
            ],
            rows: vec![ReportRow {
                dimension_values: vec![ReportValue::new("123")],
                metric_values: vec![
                    ReportValue::new("42"),
                    ReportValue::new("19.99"),
                    ReportValue::new("-3"),
                ],
            }],
            row_count: Some(1),
        };

        let rows = parse_report(&response);
        assert_eq!(rows.len(), 1);
        // Dimensions stay strings even when numeric-looking
        assert_eq!(rows[0].get("landingPage"), Some(&MetricValue::Text("123".into())));
        assert_eq!(rows[0].get("sessions"), Some(&MetricValue::Number(42.0)));
        assert_eq!(rows[0].number("purchaseRevenue"), 19.99);
        assert_eq!(rows[0].get("delta"), Some(&MetricValue::Text("-3".into())));
    }

    #[test]
    fn test_unparseable_numeric_looking_value_stays_text() {
        assert_eq!(coerce_metric("1.2.3"), MetricValue::Text("1.2.3".into()));
        assert_eq!(coerce_metric(""), MetricValue::Text(String::new()));
        assert_eq!(coerce_metric("0.5"), MetricValue::Number(0.5));
    }

    #[test]
    fn test_to_request_shape() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31"));
        let options = ReportOptions::new(&["landingPage"], &["sessions"], range, 100)
            .with_filter(string_filter("sessionDefaultChannelGroup", "Organic Search"))
            .with_order_by(metric_order_desc("sessions"));
        let body = serde_json::to_value(options.to_request()).unwrap();
        assert_eq!(
            body["dateRanges"],
            json!([{"startDate": "2024-01-01", "endDate": "2024-01-31"}])
        );
        assert_eq!(body["dimensions"], json!([{"name": "landingPage"}]));
        assert_eq!(
            body["dimensionFilter"]["filter"]["stringFilter"]["value"],
            "Organic Search"
        );
        assert_eq!(body["orderBys"][0]["desc"], true);
        assert_eq!(body["limit"], 100);
    }

    #[test]
    fn test_cache_params_distinguish_filters() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31"));
        let plain = ReportOptions::new(&["landingPage"], &["sessions"], range, 100);
        let filtered = plain.clone().with_filter(string_filter("country", "US"));
        assert_ne!(plain.cache_params("p"), filtered.cache_params("p"));
    }
}
