//! Query-level attribution of organic landing page outcomes

pub mod category;
pub mod combine;
pub mod combiner;
pub mod normalize;
pub mod reports;

pub use category::CategoryTable;
pub use combine::{attribute, Attribution, CombinedRow};
pub use combiner::{AttributionCombiner, Report};
pub use normalize::normalize_path;
pub use reports::{CategoryPerformance, ContentOpportunity, PageQuery, PageSummary, QueryRevenue};
