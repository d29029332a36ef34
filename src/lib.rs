//! Correlates Search Console query performance with GA4 outcomes by estimating how
//! much of each landing page's revenue each search query drove.

pub mod apis;
pub mod app;
pub mod attribution;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod types;

pub use attribution::{AttributionCombiner, CombinedRow, Report};
pub use cache::CacheStore;
pub use config::Config;
pub use error::{AttributionError, Result};
