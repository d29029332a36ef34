use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::MAX_LOOKBACK_DAYS;
use crate::error::{AttributionError, Result};

/// One analytics property / search-console site pair and the credential used for both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// GA4 property resource name, e.g. `properties/123456`
    pub ga4_property: String,
    /// Search Console site, e.g. `sc-domain:example.com`
    pub gsc_site_url: String,
    /// Name of the environment variable holding a bearer token for this account
    pub access_token_env: String,
}

impl Account {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn access_token(&self) -> Result<String> {
        std::env::var(&self.access_token_env).map_err(AttributionError::from)
    }
}

/// Inclusive calendar window, serialized the way both vendor APIs expect it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self { start_date, end_date }
    }

    /// `[end - days, end]`; `days` must be in `1..=MAX_LOOKBACK_DAYS`.
    pub fn ending_at(end_date: NaiveDate, days: i64) -> Result<Self> {
        check_days("days", days, 1)?;
        let start_date = end_date
            .checked_sub_signed(chrono::Duration::days(days))
            .ok_or_else(|| AttributionError::Config(format!("{} days before {} is out of range", days, end_date)))?;
        Ok(Self { start_date, end_date })
    }
}

/// Reject day counts outside `min..=MAX_LOOKBACK_DAYS` before any date arithmetic.
pub fn check_days(name: &str, days: i64, min: i64) -> Result<i64> {
    if (min..=MAX_LOOKBACK_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(AttributionError::Config(format!(
            "{} must be between {} and {}, got {}",
            name, min, MAX_LOOKBACK_DAYS, days
        )))
    }
}

/// A single analytics value: numeric when the vendor string looked numeric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Number(n) => *n,
            MetricValue::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            MetricValue::Number(_) => None,
        }
    }
}

/// One analytics row: dimension and metric names mapped to their values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MetricRow(pub BTreeMap<String, MetricValue>);

impl MetricRow {
    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.0.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(MetricValue::as_str)
    }

    /// Missing metrics read as zero
    pub fn number(&self, name: &str) -> f64 {
        self.0.get(name).map(MetricValue::as_f64).unwrap_or(0.0)
    }
}

/// One search-console row for an arbitrary set of dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchRow {
    #[serde(flatten)]
    pub dimensions: BTreeMap<String, String>,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
}

impl SearchRow {
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).map(String::as_str)
    }
}

/// Search-console row for the `[query, page]` dimension pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRow {
    pub query: String,
    pub page: String,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
}

impl QueryRow {
    pub fn from_search_row(row: &SearchRow) -> Option<Self> {
        Some(Self {
            query: row.dimension("query")?.to_string(),
            page: row.dimension("page")?.to_string(),
            clicks: row.clicks,
            impressions: row.impressions,
            ctr: row.ctr,
            position: row.position,
        })
    }
}

/// Ordered page classification rule; the first matching pattern wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    pub pattern: String,
}

/// Where a fetch result came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub from_cache: bool,
    pub cache_key: String,
}

impl<T> Fetched<T> {
    /// Transform the payload, keeping provenance
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            from_cache: self.from_cache,
            cache_key: self.cache_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_ending_at_rejects_out_of_range_days() {
        let end = date("2026-10-19");
        for days in [0, -5, MAX_LOOKBACK_DAYS + 1, 1_000_000_000, i64::MAX, i64::MIN] {
            assert!(
                matches!(DateRange::ending_at(end, days), Err(AttributionError::Config(_))),
                "days = {}",
                days
            );
        }
    }

    #[test]
    fn test_ending_at_accepts_full_window() {
        let end = date("2026-10-19");
        let range = DateRange::ending_at(end, MAX_LOOKBACK_DAYS).unwrap();
        assert!(range.start_date < range.end_date);
        assert_eq!(DateRange::ending_at(end, 1).unwrap().start_date, date("2026-10-18"));
    }
}
