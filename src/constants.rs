/// Cache type tags. Each tag has its own TTL in `[cache.ttl_hours]`.
pub const GA4_RECENT: &str = "ga4_recent";
pub const GA4_HISTORICAL: &str = "ga4_historical";
pub const GSC_QUERIES: &str = "gsc_queries";

/// Upper bound for any configured TTL (ten years)
pub const MAX_TTL_HOURS: u64 = 24 * 3650;

/// Fallback TTL for type tags missing from the configured table
pub const DEFAULT_TTL_HOURS: u64 = 24;

/// Default TTLs: recent analytics data is still being finalized by the vendor,
/// historical windows are settled.
pub const DEFAULT_GA4_RECENT_TTL_HOURS: u64 = 4;
pub const DEFAULT_GA4_HISTORICAL_TTL_HOURS: u64 = 24 * 7;
pub const DEFAULT_GSC_TTL_HOURS: u64 = 24;

/// Largest accepted `days` window (and lag / recent window) for a report
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// A date range ending within this many days of today is "recent"
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Search Console has no data for roughly the last three days
pub const GSC_REPORT_LAG_DAYS: i64 = 3;
/// Maximum rows the Search Console API returns per request
pub const GSC_MAX_ROW_LIMIT: u32 = 25_000;
pub const DEFAULT_GSC_MAX_PAGES: u32 = 40;

pub const DEFAULT_GA4_LIMIT: u32 = 10_000;
pub const ORGANIC_CHANNEL_GROUP: &str = "Organic Search";

/// Landing page value GA4 reports when it has no page
pub const NOT_SET: &str = "(not set)";

pub const DEFAULT_CATEGORY: &str = "other";

// Content opportunity thresholds
pub const OPPORTUNITY_MIN_CLICKS: f64 = 10.0;
pub const OPPORTUNITY_MAX_POSITION: f64 = 10.0;

pub const PAGE_SUMMARY_TOP_QUERIES: usize = 10;

pub const GA4_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";
pub const GSC_API_BASE: &str = "https://www.googleapis.com/webmasters/v3";
