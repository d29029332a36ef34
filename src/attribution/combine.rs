use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::attribution::normalize::normalize_path;
use crate::types::{MetricRow, QueryRow};

// GA4 field names read from the landing page report
pub const LANDING_PAGE: &str = "landingPage";
pub const SESSIONS: &str = "sessions";
pub const CONVERSIONS: &str = "conversions";
pub const PURCHASE_REVENUE: &str = "purchaseRevenue";
pub const TRANSACTIONS: &str = "transactions";

/// One search query on one page, carrying its click-share of the page's outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedRow {
    pub query: String,
    /// Normalized path used as the join key
    pub page: String,
    /// The page URL as Search Console reported it
    pub page_full: String,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
    pub page_sessions: f64,
    pub page_conversions: f64,
    pub page_revenue: f64,
    pub page_transactions: f64,
    pub click_share: f64,
    pub attributed_conversions: f64,
    pub attributed_revenue: f64,
    pub attributed_transactions: f64,
    pub conversion_rate: f64,
    pub revenue_per_click: f64,
}

/// Organic outcomes recorded for one landing page
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageOutcome {
    pub sessions: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub transactions: f64,
}

impl PageOutcome {
    fn from_row(row: &MetricRow) -> Self {
        Self {
            sessions: row.number(SESSIONS),
            conversions: row.number(CONVERSIONS),
            revenue: row.number(PURCHASE_REVENUE),
            transactions: row.number(TRANSACTIONS),
        }
    }

    fn absorb(&mut self, other: PageOutcome) {
        self.sessions += other.sessions;
        self.conversions += other.conversions;
        self.revenue += other.revenue;
        self.transactions += other.transactions;
    }
}

/// Result of joining the two sources
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Attribution {
    pub rows: Vec<CombinedRow>,
    /// Landing page rows that normalized onto an already-seen path and were summed into it
    pub duplicate_landing_pages: usize,
    /// Search Console pages with no organic landing page match, dropped
    pub unmatched_pages: usize,
    /// Search Console rows whose page could not be normalized, dropped
    pub unknown_pages: usize,
}

/// Index landing page rows by normalized path.
///
/// Rows whose path normalizes to the same key are summed; the second return value
/// counts how many rows were merged that way.
pub fn index_landing_pages(rows: &[MetricRow]) -> (HashMap<String, PageOutcome>, usize) {
    let mut index: HashMap<String, PageOutcome> = HashMap::new();
    let mut duplicates = 0;

    for row in rows {
        let Some(path) = normalize_path(row.text(LANDING_PAGE)) else {
            continue;
        };
        let outcome = PageOutcome::from_row(row);
        match index.get_mut(&path) {
            Some(existing) => {
                debug!(path = %path, "merging duplicate landing page");
                existing.absorb(outcome);
                duplicates += 1;
            }
            None => {
                index.insert(path, outcome);
            }
        }
    }

    (index, duplicates)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Join landing page outcomes with query rows and split each page's outcomes
/// across its queries in proportion to clicks.
///
/// Output keeps Search Console order: pages by first appearance, queries in
/// their original order within a page.
pub fn attribute(landing_pages: &[MetricRow], query_rows: &[QueryRow]) -> Attribution {
    let (outcomes, duplicate_landing_pages) = index_landing_pages(landing_pages);
    if duplicate_landing_pages > 0 {
        warn!(
            duplicates = duplicate_landing_pages,
            "landing pages normalized to the same path; their metrics were summed"
        );
    }

    let mut groups: Vec<(String, Vec<&QueryRow>)> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut unknown_pages = 0;

    for row in query_rows {
        let Some(path) = normalize_path(Some(&row.page)) else {
            unknown_pages += 1;
            continue;
        };
        match group_index.get(&path) {
            Some(&i) => groups[i].1.push(row),
            None => {
                group_index.insert(path.clone(), groups.len());
                groups.push((path, vec![row]));
            }
        }
    }

    let mut rows = Vec::new();
    let mut unmatched_pages = 0;

    for (page, queries) in groups {
        let Some(outcome) = outcomes.get(&page) else {
            unmatched_pages += 1;
            continue;
        };
        let total_clicks: f64 = queries.iter().map(|q| q.clicks).sum();
        let conversion_rate = ratio(outcome.conversions, outcome.sessions);

        for query in queries {
            let click_share = ratio(query.clicks, total_clicks);
            let attributed_revenue = outcome.revenue * click_share;
            rows.push(CombinedRow {
                query: query.query.clone(),
                page: page.clone(),
                page_full: query.page.clone(),
                clicks: query.clicks,
                impressions: query.impressions,
                ctr: query.ctr,
                position: query.position,
                page_sessions: outcome.sessions,
                page_conversions: outcome.conversions,
                page_revenue: outcome.revenue,
                page_transactions: outcome.transactions,
                click_share,
                attributed_conversions: outcome.conversions * click_share,
                attributed_revenue,
                attributed_transactions: outcome.transactions * click_share,
                conversion_rate,
                revenue_per_click: ratio(attributed_revenue, query.clicks),
            });
        }
    }

    debug!(
        rows = rows.len(),
        unmatched_pages,
        unknown_pages,
        "attribution complete"
    );

    Attribution {
        rows,
        duplicate_landing_pages,
        unmatched_pages,
        unknown_pages,
    }
}
