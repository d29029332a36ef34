use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::apis::analytics::today;
use crate::app::ports::{
    ApiSearchRow, DimensionFilter, DimensionFilterGroup, SearchAnalyticsRequest, SearchConsolePort,
};
use crate::cache::CacheStore;
use crate::config::SearchConsoleConfig;
use crate::constants::GSC_QUERIES;
use crate::error::{AttributionError, Result};
use crate::metrics::SourcesMetrics;
use crate::types::{check_days, Account, DateRange, Fetched, QueryRow, SearchRow};

const SOURCE: &str = "gsc";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub dimensions: Vec<String>,
    pub date_range: DateRange,
    pub filters: Vec<DimensionFilter>,
    pub search_type: String,
}

impl QueryOptions {
    pub fn new(dimensions: &[&str], date_range: DateRange) -> Self {
        Self {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            date_range,
            filters: Vec::new(),
            search_type: "web".to_string(),
        }
    }

    pub fn with_filter(mut self, dimension: &str, operator: &str, expression: &str) -> Self {
        self.filters.push(DimensionFilter {
            dimension: dimension.to_string(),
            operator: operator.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    fn to_request(&self, row_limit: u32) -> SearchAnalyticsRequest {
        let dimension_filter_groups = if self.filters.is_empty() {
            Vec::new()
        } else {
            vec![DimensionFilterGroup {
                filters: self.filters.clone(),
            }]
        };
        SearchAnalyticsRequest {
            start_date: self.date_range.start_date,
            end_date: self.date_range.end_date,
            dimensions: self.dimensions.clone(),
            dimension_filter_groups,
            search_type: Some(self.search_type.clone()),
            row_limit,
            start_row: 0,
        }
    }

    fn cache_params(&self, site_url: &str, row_limit: u32) -> Value {
        json!({
            "site": site_url,
            "dateRange": self.date_range,
            "dimensions": self.dimensions,
            "filters": self.filters,
            "searchType": self.search_type,
            "rowLimit": row_limit,
        })
    }
}

/// Window ending `lag_days` before today, since the newest days have no data yet.
pub fn lagged_date_range(today: NaiveDate, days: i64, lag_days: i64) -> Result<DateRange> {
    check_days("report_lag_days", lag_days, 0)?;
    let end_date = today
        .checked_sub_signed(chrono::Duration::days(lag_days))
        .ok_or_else(|| AttributionError::Config(format!("lag of {} days before {} is out of range", lag_days, today)))?;
    DateRange::ending_at(end_date, days)
}

/// Request pages of `row_limit` rows until a short or empty page arrives.
///
/// Fails with `PaginationExhausted` when `max_pages` full pages have been read
/// and the vendor still has not signalled the end.
pub async fn drain_pages(
    port: &dyn SearchConsolePort,
    site_url: &str,
    mut request: SearchAnalyticsRequest,
    max_pages: u32,
) -> Result<(Vec<ApiSearchRow>, u32)> {
    let row_limit = request.row_limit;
    let mut rows = Vec::new();
    let mut pages = 0u32;

    loop {
        let page = port.query(site_url, &request).await?;
        pages += 1;
        let count = page.rows.len();
        rows.extend(page.rows);
        debug!(page = pages, start_row = request.start_row, count, "search console page");

        if count < row_limit as usize {
            break;
        }
        if pages >= max_pages {
            warn!(pages, rows = rows.len(), "search console pagination cap reached");
            return Err(AttributionError::PaginationExhausted {
                pages,
                rows: rows.len(),
            });
        }
        request.start_row += row_limit;
    }

    Ok((rows, pages))
}

/// Pair each row's `keys` with the requested dimension names
pub fn to_search_rows(dimensions: &[String], rows: Vec<ApiSearchRow>) -> Vec<SearchRow> {
    rows.into_iter()
        .map(|row| SearchRow {
            dimensions: dimensions.iter().cloned().zip(row.keys).collect(),
            clicks: row.clicks,
            impressions: row.impressions,
            ctr: row.ctr,
            position: row.position,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CannibalizedPage {
    pub page: String,
    pub clicks: f64,
    pub impressions: f64,
    pub position: f64,
}

/// A query for which several pages of the same site compete
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CannibalizationGroup {
    pub query: String,
    pub total_clicks: f64,
    pub total_impressions: f64,
    pub pages: Vec<CannibalizedPage>,
}

/// Rows ranking on page one or two with plenty of impressions but few clicks
pub fn find_opportunities(rows: Vec<QueryRow>, min_impressions: f64) -> Vec<QueryRow> {
    let mut matches: Vec<QueryRow> = rows
        .into_iter()
        .filter(|r| {
            r.position >= 5.0 && r.position <= 20.0 && r.impressions >= min_impressions && r.ctr < 0.05
        })
        .collect();
    matches.sort_by(|a, b| b.impressions.total_cmp(&a.impressions));
    matches
}

pub fn find_cannibalization(rows: &[QueryRow], min_impressions: f64) -> Vec<CannibalizationGroup> {
    let mut by_query: BTreeMap<&str, Vec<&QueryRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.impressions >= min_impressions) {
        by_query.entry(row.query.as_str()).or_default().push(row);
    }

    let mut groups: Vec<CannibalizationGroup> = by_query
        .into_iter()
        .filter(|(_, pages)| pages.len() > 1)
        .map(|(query, pages)| {
            let mut pages: Vec<CannibalizedPage> = pages
                .into_iter()
                .map(|r| CannibalizedPage {
                    page: r.page.clone(),
                    clicks: r.clicks,
                    impressions: r.impressions,
                    position: r.position,
                })
                .collect();
            pages.sort_by(|a, b| b.clicks.total_cmp(&a.clicks));
            CannibalizationGroup {
                query: query.to_string(),
                total_clicks: pages.iter().map(|p| p.clicks).sum(),
                total_impressions: pages.iter().map(|p| p.impressions).sum(),
                pages,
            }
        })
        .collect();
    groups.sort_by(|a, b| b.total_impressions.total_cmp(&a.total_impressions));
    groups
}

fn top_by_clicks(mut rows: Vec<SearchRow>, limit: usize) -> Vec<SearchRow> {
    rows.sort_by(|a, b| b.clicks.total_cmp(&a.clicks));
    rows.truncate(limit);
    rows
}

/// Cached Search Console queries for one site.
pub struct SearchConsoleAdapter {
    account_id: String,
    site_url: String,
    cache: CacheStore,
    port: Arc<dyn SearchConsolePort>,
    config: SearchConsoleConfig,
    refresh: bool,
}

impl SearchConsoleAdapter {
    pub fn new(
        account: &Account,
        cache: CacheStore,
        port: Arc<dyn SearchConsolePort>,
        config: SearchConsoleConfig,
    ) -> Self {
        Self {
            account_id: account.id.clone(),
            site_url: account.gsc_site_url.clone(),
            cache,
            port,
            config,
            refresh: false,
        }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn date_range(&self, days: i64) -> Result<DateRange> {
        lagged_date_range(today(), days, self.config.report_lag_days)
    }

    /// Fully drain pagination, then cache all rows under one key.
    #[instrument(skip(self, options), fields(account = %self.account_id, dims = ?options.dimensions))]
    pub async fn query(&self, options: QueryOptions) -> Result<Fetched<Vec<SearchRow>>> {
        let row_limit = self.config.row_limit;
        let max_pages = self.config.max_pages;
        let params = options.cache_params(&self.site_url, row_limit);
        let request = options.to_request(row_limit);
        let dimensions = options.dimensions;
        let port = Arc::clone(&self.port);
        let site_url = self.site_url.clone();

        let fetch = move || async move {
            let started = Instant::now();
            let (rows, pages) = match drain_pages(port.as_ref(), &site_url, request, max_pages).await {
                Ok(drained) => drained,
                Err(e) => {
                    SourcesMetrics::record_fetch_error(SOURCE);
                    return Err(e);
                }
            };
            SourcesMetrics::record_pages(pages);
            SourcesMetrics::record_fetch(SOURCE, started.elapsed().as_secs_f64(), rows.len());
            info!(site = %site_url, rows = rows.len(), pages, "fetched search analytics");
            Ok(to_search_rows(&dimensions, rows))
        };

        if self.refresh {
            self.cache.refresh(GSC_QUERIES, params, fetch).await
        } else {
            self.cache.get_or_fetch(GSC_QUERIES, params, fetch).await
        }
    }

    /// Site totals: a single dimensionless row
    pub async fn overview(&self, days: i64) -> Result<Fetched<Vec<SearchRow>>> {
        self.query(QueryOptions::new(&[], self.date_range(days)?)).await
    }

    pub async fn top_queries(&self, days: i64, limit: usize) -> Result<Fetched<Vec<SearchRow>>> {
        let fetched = self.query(QueryOptions::new(&["query"], self.date_range(days)?)).await?;
        Ok(fetched.map(|rows| top_by_clicks(rows, limit)))
    }

    pub async fn top_pages(&self, days: i64, limit: usize) -> Result<Fetched<Vec<SearchRow>>> {
        let fetched = self.query(QueryOptions::new(&["page"], self.date_range(days)?)).await?;
        Ok(fetched.map(|rows| top_by_clicks(rows, limit)))
    }

    /// Query × page rows; the attribution input.
    pub async fn query_pages(&self, days: i64) -> Result<Fetched<Vec<QueryRow>>> {
        let fetched = self
            .query(QueryOptions::new(&["query", "page"], self.date_range(days)?))
            .await?;
        Ok(fetched.map(|rows| rows.iter().filter_map(QueryRow::from_search_row).collect()))
    }

    pub async fn trends(&self, days: i64) -> Result<Fetched<Vec<SearchRow>>> {
        let fetched = self.query(QueryOptions::new(&["date"], self.date_range(days)?)).await?;
        Ok(fetched.map(|mut rows| {
            rows.sort_by(|a, b| a.dimension("date").cmp(&b.dimension("date")));
            rows
        }))
    }

    pub async fn by_device(&self, days: i64) -> Result<Fetched<Vec<SearchRow>>> {
        self.query(QueryOptions::new(&["device"], self.date_range(days)?)).await
    }

    pub async fn by_country(&self, days: i64, limit: usize) -> Result<Fetched<Vec<SearchRow>>> {
        let fetched = self.query(QueryOptions::new(&["country"], self.date_range(days)?)).await?;
        Ok(fetched.map(|rows| top_by_clicks(rows, limit)))
    }

    pub async fn opportunities(&self, days: i64, min_impressions: f64) -> Result<Fetched<Vec<QueryRow>>> {
        let fetched = self.query_pages(days).await?;
        Ok(fetched.map(|rows| find_opportunities(rows, min_impressions)))
    }

    pub async fn cannibalization(
        &self,
        days: i64,
        min_impressions: f64,
    ) -> Result<Fetched<Vec<CannibalizationGroup>>> {
        let fetched = self.query_pages(days).await?;
        Ok(fetched.map(|rows| find_cannibalization(&rows, min_impressions)))
    }
}
