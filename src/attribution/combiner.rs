use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::apis::analytics::AnalyticsAdapter;
use crate::apis::search_console::SearchConsoleAdapter;
use crate::attribution::category::CategoryTable;
use crate::attribution::combine::{attribute, Attribution};
use crate::attribution::reports::{
    category_performance, content_opportunities, page_summary, revenue_queries, CategoryPerformance,
    ContentOpportunity, PageSummary, QueryRevenue,
};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::Result;
use crate::infra::http_client::GoogleHttp;

/// A report plus where its inputs came from
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report<T> {
    pub ga4_from_cache: bool,
    pub gsc_from_cache: bool,
    pub ga4_cache_key: String,
    pub gsc_cache_key: String,
    pub data: T,
}

impl<T> Report<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Report<U> {
        Report {
            ga4_from_cache: self.ga4_from_cache,
            gsc_from_cache: self.gsc_from_cache,
            ga4_cache_key: self.ga4_cache_key,
            gsc_cache_key: self.gsc_cache_key,
            data: f(self.data),
        }
    }
}

/// Joins organic landing page outcomes with Search Console queries for one account.
pub struct AttributionCombiner {
    analytics: AnalyticsAdapter,
    search_console: SearchConsoleAdapter,
    categories: CategoryTable,
}

impl AttributionCombiner {
    pub fn new(analytics: AnalyticsAdapter, search_console: SearchConsoleAdapter) -> Self {
        Self {
            analytics,
            search_console,
            categories: CategoryTable::default(),
        }
    }

    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = categories;
        self
    }

    /// Wire up the HTTP transport, cache and adapters for one configured account.
    pub fn for_account(config: &Config, account_id: Option<&str>, refresh: bool) -> Result<Self> {
        let account = config.account(account_id)?;
        let http = Arc::new(GoogleHttp::for_account(account, &config.http)?);
        let cache = CacheStore::from_config(&config.cache, account);

        let analytics = AnalyticsAdapter::new(account, cache.clone(), http.clone(), config.analytics.clone())
            .with_refresh(refresh);
        let search_console =
            SearchConsoleAdapter::new(account, cache, http, config.search_console.clone())
                .with_refresh(refresh);

        Ok(Self::new(analytics, search_console)
            .with_categories(CategoryTable::from_config(&config.categories)?))
    }

    pub fn analytics(&self) -> &AnalyticsAdapter {
        &self.analytics
    }

    pub fn search_console(&self) -> &SearchConsoleAdapter {
        &self.search_console
    }

    /// Fetch both sources concurrently and attribute page outcomes to queries.
    #[instrument(skip(self))]
    pub async fn combine(&self, days: i64) -> Result<Report<Attribution>> {
        let (landing_pages, query_pages) = tokio::try_join!(
            self.analytics.organic_landing_pages(days),
            self.search_console.query_pages(days),
        )?;

        let attribution = attribute(&landing_pages.data, &query_pages.data);
        info!(
            ga4_rows = landing_pages.data.len(),
            gsc_rows = query_pages.data.len(),
            combined = attribution.rows.len(),
            ga4_from_cache = landing_pages.from_cache,
            gsc_from_cache = query_pages.from_cache,
            "combined search and analytics data"
        );

        Ok(Report {
            ga4_from_cache: landing_pages.from_cache,
            gsc_from_cache: query_pages.from_cache,
            ga4_cache_key: landing_pages.cache_key,
            gsc_cache_key: query_pages.cache_key,
            data: attribution,
        })
    }

    pub async fn revenue_queries(&self, days: i64, limit: usize) -> Result<Report<Vec<QueryRevenue>>> {
        let report = self.combine(days).await?;
        Ok(report.map(|a| revenue_queries(&a.rows, limit)))
    }

    pub async fn category_performance(&self, days: i64) -> Result<Report<Vec<CategoryPerformance>>> {
        let report = self.combine(days).await?;
        Ok(report.map(|a| category_performance(&a.rows, &self.categories)))
    }

    pub async fn content_opportunities(
        &self,
        days: i64,
        limit: Option<usize>,
    ) -> Result<Report<Vec<ContentOpportunity>>> {
        let report = self.combine(days).await?;
        Ok(report.map(|a| content_opportunities(&a.rows, limit)))
    }

    pub async fn page_summary(&self, days: i64) -> Result<Report<Vec<PageSummary>>> {
        let report = self.combine(days).await?;
        Ok(report.map(|a| page_summary(&a.rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_provenance_in_camel_case() {
        let report = Report {
            ga4_from_cache: true,
            gsc_from_cache: false,
            ga4_cache_key: "ga4_recent_abc".to_string(),
            gsc_cache_key: "gsc_queries_def".to_string(),
            data: vec![1, 2],
        };
        let value = serde_json::to_value(report.map(|d| d.len())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ga4FromCache": true,
                "gscFromCache": false,
                "ga4CacheKey": "ga4_recent_abc",
                "gscCacheKey": "gsc_queries_def",
                "data": 2,
            })
        );
    }
}
