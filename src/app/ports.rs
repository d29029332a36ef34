//! Vendor transport ports and their request/response wire shapes.
//!
//! Adapters in `apis` talk to these traits only; `infra` provides the reqwest
//! implementations and tests substitute in-memory ones.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::DateRange;

#[async_trait]
pub trait AnalyticsPort: Send + Sync {
    async fn run_report(&self, property: &str, request: &RunReportRequest) -> Result<RunReportResponse>;
}

#[async_trait]
pub trait SearchConsolePort: Send + Sync {
    /// Fetch one page of rows (`request.start_row .. start_row + row_limit`)
    async fn query(
        &self,
        site_url: &str,
        request: &SearchAnalyticsRequest,
    ) -> Result<SearchAnalyticsResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NameRef {
    pub name: String,
}

impl NameRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// GA4 Data API `runReport` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    pub date_ranges: Vec<DateRange>,
    pub dimensions: Vec<NameRef>,
    pub metrics: Vec<NameRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<Value>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReportResponse {
    #[serde(default)]
    pub dimension_headers: Vec<NameRef>,
    #[serde(default)]
    pub metric_headers: Vec<NameRef>,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: Vec<ReportValue>,
    #[serde(default)]
    pub metric_values: Vec<ReportValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportValue {
    #[serde(default)]
    pub value: String,
}

impl ReportValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// Search Console `searchAnalytics/query` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimension_filter_groups: Vec<DimensionFilterGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    pub row_limit: u32,
    pub start_row: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionFilterGroup {
    pub filters: Vec<DimensionFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionFilter {
    pub dimension: String,
    pub operator: String,
    pub expression: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchAnalyticsResponse {
    #[serde(default)]
    pub rows: Vec<ApiSearchRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiSearchRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}
