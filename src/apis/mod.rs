pub mod analytics;
pub mod search_console;

pub use analytics::{AnalyticsAdapter, ReportOptions};
pub use search_console::{QueryOptions, SearchConsoleAdapter};
