use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::key::is_safe_component;
use crate::constants::*;
use crate::types::check_days;
use crate::error::{AttributionError, Result};
use crate::types::{Account, CategoryRule};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub search_console: SearchConsoleConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub accounts: Vec<Account>,
    /// Overrides the built-in page category table when non-empty
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Per cache type TTLs; merged over the defaults
    #[serde(default)]
    pub ttl_hours: HashMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,
    #[serde(default = "default_ga4_limit")]
    pub row_limit: u32,
    #[serde(default = "default_organic_channel")]
    pub organic_channel_group: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConsoleConfig {
    #[serde(default = "default_gsc_row_limit")]
    pub row_limit: u32,
    #[serde(default = "default_gsc_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_report_lag_days")]
    pub report_lag_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}
fn default_recent_window_days() -> i64 {
    RECENT_WINDOW_DAYS
}
fn default_ga4_limit() -> u32 {
    DEFAULT_GA4_LIMIT
}
fn default_organic_channel() -> String {
    ORGANIC_CHANNEL_GROUP.to_string()
}
fn default_gsc_row_limit() -> u32 {
    GSC_MAX_ROW_LIMIT
}
fn default_gsc_max_pages() -> u32 {
    DEFAULT_GSC_MAX_PAGES
}
fn default_report_lag_days() -> i64 {
    GSC_REPORT_LAG_DAYS
}
fn default_timeout_seconds() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_hours: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Built-in TTLs overlaid with whatever the config file sets.
    pub fn ttl_table(&self) -> HashMap<String, Duration> {
        let mut table: HashMap<String, Duration> = [
            (GA4_RECENT, DEFAULT_GA4_RECENT_TTL_HOURS),
            (GA4_HISTORICAL, DEFAULT_GA4_HISTORICAL_TTL_HOURS),
            (GSC_QUERIES, DEFAULT_GSC_TTL_HOURS),
        ]
        .into_iter()
        .map(|(tag, hours)| (tag.to_string(), hours_to_duration(hours)))
        .collect();

        for (tag, hours) in &self.ttl_hours {
            table.insert(tag.clone(), hours_to_duration(*hours));
        }
        table
    }
}

pub fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: default_recent_window_days(),
            row_limit: default_ga4_limit(),
            organic_channel_group: default_organic_channel(),
        }
    }
}

impl Default for SearchConsoleConfig {
    fn default() -> Self {
        Self {
            row_limit: default_gsc_row_limit(),
            max_pages: default_gsc_max_pages(),
            report_lag_days: default_report_lag_days(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            AttributionError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(AttributionError::Config(
                "at least one [[accounts]] entry is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !is_safe_component(&account.id) {
                return Err(AttributionError::Config(format!(
                    "account id '{}' must be a plain name without path separators or '..'",
                    account.id
                )));
            }
            if !seen.insert(account.id.as_str()) {
                return Err(AttributionError::Config(format!(
                    "duplicate account id '{}'",
                    account.id
                )));
            }
        }

        if self.search_console.row_limit == 0 || self.search_console.row_limit > GSC_MAX_ROW_LIMIT
        {
            return Err(AttributionError::Config(format!(
                "search_console.row_limit must be between 1 and {}",
                GSC_MAX_ROW_LIMIT
            )));
        }
        if self.search_console.max_pages == 0 {
            return Err(AttributionError::Config(
                "search_console.max_pages must be positive".into(),
            ));
        }
        for (tag, hours) in &self.cache.ttl_hours {
            if *hours > MAX_TTL_HOURS {
                return Err(AttributionError::Config(format!(
                    "cache.ttl_hours.{} must be at most {}",
                    tag, MAX_TTL_HOURS
                )));
            }
        }
        check_days("search_console.report_lag_days", self.search_console.report_lag_days, 0)?;
        check_days("analytics.recent_window_days", self.analytics.recent_window_days, 0)?;

        if self.analytics.row_limit == 0 {
            return Err(AttributionError::Config(
                "analytics.row_limit must be positive".into(),
            ));
        }

        for rule in &self.categories {
            regex::Regex::new(&rule.pattern)?;
        }
        Ok(())
    }

    /// The named account, or the first configured one when no id is given.
    pub fn account(&self, id: Option<&str>) -> Result<&Account> {
        match id {
            Some(id) => self
                .accounts
                .iter()
                .find(|a| a.id == id)
                .ok_or_else(|| AttributionError::UnknownAccount(id.to_string())),
            None => self
                .accounts
                .first()
                .ok_or_else(|| AttributionError::Config("no accounts configured".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[accounts]]
        id = "shop"
        ga4_property = "properties/1"
        gsc_site_url = "sc-domain:shop.example"
        access_token_env = "SHOP_TOKEN"
    "#;

    #[test]
    fn test_defaults_apply_for_missing_sections() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.cache.dir, PathBuf::from(".cache"));
        assert_eq!(config.search_console.row_limit, GSC_MAX_ROW_LIMIT);
        assert_eq!(config.search_console.report_lag_days, GSC_REPORT_LAG_DAYS);
        assert_eq!(config.analytics.recent_window_days, RECENT_WINDOW_DAYS);
        assert!(config.categories.is_empty());
    }

    #[test]
    fn test_ttl_overrides_merge_with_defaults() {
        let content = format!("{}\n[cache.ttl_hours]\nga4_recent = 1\n", MINIMAL);
        let config = Config::from_toml_str(&content).unwrap();
        let table = config.cache.ttl_table();
        assert_eq!(table[GA4_RECENT], Duration::from_secs(3600));
        assert_eq!(
            table[GA4_HISTORICAL],
            hours_to_duration(DEFAULT_GA4_HISTORICAL_TTL_HOURS)
        );
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let content = format!("{}{}", MINIMAL, MINIMAL);
        assert!(matches!(
            Config::from_toml_str(&content),
            Err(AttributionError::Config(_))
        ));
    }

    #[test]
    fn test_bad_category_pattern_rejected() {
        let content = format!("{}\n[[categories]]\nname = \"x\"\npattern = \"(\"\n", MINIMAL);
        assert!(matches!(
            Config::from_toml_str(&content),
            Err(AttributionError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_account_id_cannot_escape_cache_root() {
        for id in ["..", "../other", "a/b", "a\\b", ""] {
            let content = MINIMAL.replace("id = \"shop\"", &format!("id = {:?}", id));
            assert!(
                matches!(Config::from_toml_str(&content), Err(AttributionError::Config(_))),
                "id = {:?}",
                id
            );
        }
    }

    #[test]
    fn test_huge_ttl_rejected_and_conversion_saturates() {
        let content = format!("{}\n[cache.ttl_hours]\ngsc_queries = {}\n", MINIMAL, i64::MAX);
        assert!(matches!(
            Config::from_toml_str(&content),
            Err(AttributionError::Config(_))
        ));
        assert_eq!(hours_to_duration(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_negative_lag_rejected() {
        let content = format!("{}\n[search_console]\nreport_lag_days = -2\n", MINIMAL);
        assert!(matches!(
            Config::from_toml_str(&content),
            Err(AttributionError::Config(_))
        ));
    }

    #[test]
    fn test_account_lookup() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.account(None).unwrap().id, "shop");
        assert_eq!(config.account(Some("shop")).unwrap().display_name(), "shop");
        assert!(matches!(
            config.account(Some("missing")),
            Err(AttributionError::UnknownAccount(_))
        ));
    }
}
