use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{
    AnalyticsPort, RunReportRequest, RunReportResponse, SearchAnalyticsRequest,
    SearchAnalyticsResponse, SearchConsolePort,
};
use crate::config::HttpConfig;
use crate::constants::{GA4_API_BASE, GSC_API_BASE};
use crate::error::{AttributionError, Result};
use crate::types::Account;

/// Bearer-token client for the GA4 Data API and the Search Console API.
///
/// Token minting and refresh happen elsewhere; this only carries the token.
pub struct GoogleHttp {
    client: reqwest::Client,
    token: String,
    ga4_base: String,
    gsc_base: String,
}

impl GoogleHttp {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            ga4_base: GA4_API_BASE.to_string(),
            gsc_base: GSC_API_BASE.to_string(),
        })
    }

    pub fn for_account(account: &Account, http: &HttpConfig) -> Result<Self> {
        let token = account.access_token().map_err(|e| {
            AttributionError::Config(format!(
                "account '{}': missing access token in ${} ({})",
                account.id, account.access_token_env, e
            ))
        })?;
        Self::new(token, Duration::from_secs(http.timeout_seconds))
    }

    /// Point at different API hosts (staging proxies, local fakes)
    pub fn with_base_urls(mut self, ga4_base: impl Into<String>, gsc_base: impl Into<String>) -> Self {
        self.ga4_base = ga4_base.into();
        self.gsc_base = gsc_base.into();
        self
    }

    fn run_report_url(&self, property: &str) -> Result<Url> {
        let raw = format!("{}/{}:runReport", self.ga4_base.trim_end_matches('/'), property);
        Url::parse(&raw).map_err(|e| AttributionError::Config(format!("invalid GA4 url '{}': {}", raw, e)))
    }

    fn search_analytics_url(&self, site_url: &str) -> Result<Url> {
        let mut url = Url::parse(&self.gsc_base)
            .map_err(|e| AttributionError::Config(format!("invalid GSC url '{}': {}", self.gsc_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| AttributionError::Config(format!("GSC base '{}' cannot take a path", self.gsc_base)))?
            .pop_if_empty()
            .push("sites")
            .push(site_url)
            .push("searchAnalytics")
            .push("query");
        Ok(url)
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(url = %url, "POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AttributionError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<R>().await?)
    }
}

#[async_trait]
impl AnalyticsPort for GoogleHttp {
    async fn run_report(&self, property: &str, request: &RunReportRequest) -> Result<RunReportResponse> {
        let url = self.run_report_url(property)?;
        self.post_json(url, request).await
    }
}

#[async_trait]
impl SearchConsolePort for GoogleHttp {
    async fn query(
        &self,
        site_url: &str,
        request: &SearchAnalyticsRequest,
    ) -> Result<SearchAnalyticsResponse> {
        let url = self.search_analytics_url(site_url)?;
        self.post_json(url, request).await
    }
}
