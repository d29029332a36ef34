use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use query_attribution::apis::{AnalyticsAdapter, SearchConsoleAdapter};
use query_attribution::app::ports::{
    AnalyticsPort, ApiSearchRow, NameRef, ReportRow, ReportValue, RunReportRequest, RunReportResponse,
    SearchAnalyticsRequest, SearchAnalyticsResponse, SearchConsolePort,
};
use query_attribution::attribution::CategoryTable;
use query_attribution::cache::CacheStore;
use query_attribution::config::{AnalyticsConfig, SearchConsoleConfig};
use query_attribution::types::Account;
use query_attribution::{AttributionCombiner, AttributionError};

struct MockAnalytics {
    pages: Vec<(&'static str, f64, f64, f64, f64)>,
    calls: AtomicUsize,
    last_request: Mutex<Option<RunReportRequest>>,
}

impl MockAnalytics {
    fn new(pages: Vec<(&'static str, f64, f64, f64, f64)>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AnalyticsPort for MockAnalytics {
    async fn run_report(
        &self,
        _property: &str,
        request: &RunReportRequest,
    ) -> query_attribution::Result<RunReportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(RunReportResponse {
            dimension_headers: vec![NameRef::new("landingPage")],
            metric_headers: ["sessions", "conversions", "purchaseRevenue", "transactions"]
                .iter()
                .map(|m| NameRef::new(*m))
                .collect(),
            rows: self
                .pages
                .iter()
                .map(|(page, sessions, conversions, revenue, transactions)| ReportRow {
                    dimension_values: vec![ReportValue::new(*page)],
                    metric_values: vec![
                        ReportValue::new(sessions.to_string()),
                        ReportValue::new(conversions.to_string()),
                        ReportValue::new(revenue.to_string()),
                        ReportValue::new(transactions.to_string()),
                    ],
                })
                .collect(),
            row_count: Some(self.pages.len() as u64),
        })
    }
}

/// Serves `rows` one page at a time, honoring `start_row` and `row_limit`.
struct MockSearchConsole {
    rows: Vec<ApiSearchRow>,
    calls: AtomicUsize,
}

impl MockSearchConsole {
    fn new(rows: Vec<ApiSearchRow>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchConsolePort for MockSearchConsole {
    async fn query(
        &self,
        _site_url: &str,
        request: &SearchAnalyticsRequest,
    ) -> query_attribution::Result<SearchAnalyticsResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = (request.start_row as usize).min(self.rows.len());
        let end = (start + request.row_limit as usize).min(self.rows.len());
        Ok(SearchAnalyticsResponse {
            rows: self.rows[start..end].to_vec(),
        })
    }
}

fn search_row(query: &str, page: &str, clicks: f64, position: f64) -> ApiSearchRow {
    ApiSearchRow {
        keys: vec![query.to_string(), page.to_string()],
        clicks,
        impressions: clicks * 20.0,
        ctr: 0.05,
        position,
    }
}

fn account() -> Account {
    Account {
        id: "shop".to_string(),
        name: Some("Example Shop".to_string()),
        ga4_property: "properties/123".to_string(),
        gsc_site_url: "https://shop.example/".to_string(),
        access_token_env: "QA_TEST_TOKEN".to_string(),
    }
}

fn gsc_config(row_limit: u32, max_pages: u32) -> SearchConsoleConfig {
    SearchConsoleConfig {
        row_limit,
        max_pages,
        report_lag_days: 3,
    }
}

fn combiner(
    cache: &CacheStore,
    analytics: Arc<MockAnalytics>,
    search_console: Arc<MockSearchConsole>,
    config: SearchConsoleConfig,
) -> AttributionCombiner {
    let account = account();
    AttributionCombiner::new(
        AnalyticsAdapter::new(&account, cache.clone(), analytics, AnalyticsConfig::default()),
        SearchConsoleAdapter::new(&account, cache.clone(), search_console, config),
    )
}

fn shop_analytics() -> Arc<MockAnalytics> {
    Arc::new(MockAnalytics::new(vec![
        ("/shoes", 200.0, 8.0, 100.0, 4.0),
        ("/blog/fit-guide", 120.0, 0.0, 0.0, 0.0),
        ("(not set)", 40.0, 2.0, 300.0, 2.0),
    ]))
}

fn shop_search_console() -> Arc<MockSearchConsole> {
    Arc::new(MockSearchConsole::new(vec![
        search_row("buy shoes", "https://shop.example/shoes", 30.0, 2.0),
        search_row("running shoes", "https://shop.example/shoes", 10.0, 4.0),
        search_row("how shoes should fit", "https://shop.example/blog/fit-guide", 25.0, 3.0),
        search_row("shoe sizes", "https://shop.example/blog/fit-guide", 12.0, 8.0),
        search_row("shoe outlet", "https://shop.example/outlet", 9.0, 6.0),
    ]))
}

#[tokio::test]
async fn test_combine_splits_page_revenue_by_click_share() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let combiner = combiner(&cache, shop_analytics(), shop_search_console(), gsc_config(25_000, 5));

    let report = combiner.combine(28).await?;
    assert!(!report.ga4_from_cache);
    assert!(!report.gsc_from_cache);
    assert!(report.ga4_cache_key.starts_with("ga4_recent_"));
    assert!(report.gsc_cache_key.starts_with("gsc_queries_"));

    let rows = &report.data.rows;
    assert_eq!(rows.len(), 4);
    assert_eq!(report.data.unmatched_pages, 1);

    let buy = rows.iter().find(|r| r.query == "buy shoes").unwrap();
    assert_eq!(buy.page, "/shoes");
    assert_eq!(buy.click_share, 0.75);
    assert_eq!(buy.attributed_revenue, 75.0);
    assert_eq!(buy.attributed_transactions, 3.0);

    let running = rows.iter().find(|r| r.query == "running shoes").unwrap();
    assert_eq!(running.attributed_revenue, 25.0);

    // "(not set)" revenue is never spread onto real pages
    let total: f64 = rows.iter().map(|r| r.attributed_revenue).sum();
    assert_eq!(total, 100.0);

    for row in rows {
        assert!((0.0..=1.0).contains(&row.click_share));
    }
    Ok(())
}

#[tokio::test]
async fn test_second_combine_is_served_from_cache() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let analytics = shop_analytics();
    let search_console = shop_search_console();
    let combiner = combiner(&cache, analytics.clone(), search_console.clone(), gsc_config(25_000, 5));

    let first = combiner.combine(28).await?;
    let second = combiner.combine(28).await?;

    assert!(second.ga4_from_cache);
    assert!(second.gsc_from_cache);
    assert_eq!(first.ga4_cache_key, second.ga4_cache_key);
    assert_eq!(first.data, second.data);
    assert_eq!(analytics.calls.load(Ordering::SeqCst), 1);
    assert_eq!(search_console.calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 2);
    Ok(())
}

#[tokio::test]
async fn test_refresh_bypasses_lookup_but_rewrites_entry() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let analytics = shop_analytics();
    let account = account();

    let cached = AnalyticsAdapter::new(&account, cache.clone(), analytics.clone(), AnalyticsConfig::default());
    cached.organic_landing_pages(28).await?;

    let refreshing = AnalyticsAdapter::new(&account, cache.clone(), analytics.clone(), AnalyticsConfig::default())
        .with_refresh(true);
    let fetched = refreshing.organic_landing_pages(28).await?;
    assert!(!fetched.from_cache);
    assert_eq!(analytics.calls.load(Ordering::SeqCst), 2);

    let again = cached.organic_landing_pages(28).await?;
    assert!(again.from_cache);
    assert_eq!(analytics.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_organic_report_filters_on_channel_group() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let analytics = shop_analytics();
    let adapter = AnalyticsAdapter::new(&account(), cache, analytics.clone(), AnalyticsConfig::default());

    let fetched = adapter.organic_landing_pages(28).await?;
    assert_eq!(fetched.data.len(), 3);
    assert_eq!(fetched.data[0].number("purchaseRevenue"), 100.0);

    let request = analytics.last_request.lock().unwrap().clone().unwrap();
    let filter = serde_json::to_string(&request.dimension_filter)?;
    assert!(filter.contains("sessionDefaultChannelGroup"));
    assert!(filter.contains("Organic Search"));
    Ok(())
}

#[tokio::test]
async fn test_search_console_drains_every_page_into_one_entry() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let search_console = shop_search_console();
    let adapter = SearchConsoleAdapter::new(&account(), cache.clone(), search_console.clone(), gsc_config(2, 10));

    let fetched = adapter.query_pages(28).await?;
    assert_eq!(fetched.data.len(), 5);
    // pages of 2, 2, then a short page of 1
    assert_eq!(search_console.calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.list().len(), 1);

    let again = adapter.query_pages(28).await?;
    assert!(again.from_cache);
    assert_eq!(again.data, fetched.data);
    assert_eq!(search_console.calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_exact_multiple_of_row_limit_ends_on_empty_page() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let search_console = Arc::new(MockSearchConsole::new(vec![
        search_row("a", "/a", 1.0, 1.0),
        search_row("b", "/b", 1.0, 1.0),
    ]));
    let adapter = SearchConsoleAdapter::new(&account(), cache, search_console.clone(), gsc_config(2, 10));

    let fetched = adapter.query_pages(28).await?;
    assert_eq!(fetched.data.len(), 2);
    assert_eq!(search_console.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_pagination_cap_fails_without_caching() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let rows = (0..10)
        .map(|i| search_row(&format!("q{}", i), "/p", 1.0, 1.0))
        .collect();
    let search_console = Arc::new(MockSearchConsole::new(rows));
    let adapter = SearchConsoleAdapter::new(&account(), cache.clone(), search_console.clone(), gsc_config(2, 3));

    let err = adapter.query_pages(28).await.unwrap_err();
    assert!(matches!(
        err,
        AttributionError::PaginationExhausted { pages: 3, rows: 6 }
    ));
    assert!(cache.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_derived_views() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let combiner = combiner(&cache, shop_analytics(), shop_search_console(), gsc_config(25_000, 5))
        .with_categories(CategoryTable::default());

    let top = combiner.revenue_queries(28, 1).await?;
    assert_eq!(top.data.len(), 1);
    assert_eq!(top.data[0].query, "buy shoes");
    assert_eq!(top.data[0].total_attributed_revenue, 75.0);

    let opportunities = combiner.content_opportunities(28, None).await?;
    assert!(!opportunities.data.is_empty());
    for opportunity in &opportunities.data {
        assert!(opportunity.clicks >= 10.0);
        assert!(opportunity.position <= 10.0);
    }
    assert!(opportunities.data.iter().any(|o| o.query == "how shoes should fit"));
    assert!(!opportunities.data.iter().any(|o| o.query == "buy shoes"));

    let pages = combiner.page_summary(28).await?;
    assert_eq!(pages.data.len(), 2);
    assert_eq!(pages.data[0].page, "/shoes");
    assert_eq!(pages.data[0].page_revenue, 100.0);
    assert_eq!(pages.data[0].query_count, 2);
    assert_eq!(pages.data[0].top_queries[0].query, "buy shoes");

    let categories = combiner.category_performance(28).await?;
    let attributed: f64 = categories.data.iter().map(|c| c.attributed_revenue).sum();
    assert_eq!(attributed, 100.0);
    Ok(())
}

#[tokio::test]
async fn test_source_errors_propagate() -> Result<()> {
    struct Failing;

    #[async_trait]
    impl SearchConsolePort for Failing {
        async fn query(
            &self,
            _site_url: &str,
            _request: &SearchAnalyticsRequest,
        ) -> query_attribution::Result<SearchAnalyticsResponse> {
            Err(AttributionError::Api {
                status: 403,
                message: "forbidden".to_string(),
            })
        }
    }

    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let account = account();
    let combiner = AttributionCombiner::new(
        AnalyticsAdapter::new(&account, cache.clone(), shop_analytics(), AnalyticsConfig::default()),
        SearchConsoleAdapter::new(&account, cache.clone(), Arc::new(Failing), gsc_config(100, 5)),
    );

    let err = combiner.combine(28).await.unwrap_err();
    assert!(matches!(err, AttributionError::Api { status: 403, .. }));
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_days_fail_before_any_fetch() -> Result<()> {
    let dir = tempdir()?;
    let cache = CacheStore::new(dir.path(), "shop", HashMap::new());
    let analytics = shop_analytics();
    let search_console = shop_search_console();
    let combiner = combiner(&cache, analytics.clone(), search_console.clone(), gsc_config(25_000, 5));

    for days in [-7, 0, 1_000_000_000] {
        let err = combiner.combine(days).await.unwrap_err();
        assert!(matches!(err, AttributionError::Config(_)), "days = {}: {}", days, err);
    }
    assert_eq!(analytics.calls.load(Ordering::SeqCst), 0);
    assert_eq!(search_console.calls.load(Ordering::SeqCst), 0);
    assert!(cache.list().is_empty());
    Ok(())
}

