//! Views derived from combined rows. All are pure functions; the combiner adds provenance.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::attribution::category::CategoryTable;
use crate::attribution::combine::CombinedRow;
use crate::constants::{OPPORTUNITY_MAX_POSITION, OPPORTUNITY_MIN_CLICKS, PAGE_SUMMARY_TOP_QUERIES};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRevenue {
    pub query: String,
    pub total_attributed_revenue: f64,
    pub total_attributed_conversions: f64,
    pub total_attributed_transactions: f64,
    pub total_clicks: f64,
    pub total_impressions: f64,
    pub avg_position: f64,
    pub avg_ctr: f64,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryPerformance {
    pub category: String,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub attributed_revenue: f64,
    pub attributed_conversions: f64,
    pub attributed_transactions: f64,
    pub page_count: usize,
    pub query_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentOpportunity {
    pub query: String,
    pub page: String,
    pub page_full: String,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
    pub page_sessions: f64,
    pub opportunity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageQuery {
    pub query: String,
    pub clicks: f64,
    pub impressions: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSummary {
    pub page: String,
    pub page_full: String,
    pub page_sessions: f64,
    pub page_conversions: f64,
    pub page_revenue: f64,
    pub page_transactions: f64,
    pub conversion_rate: f64,
    pub total_clicks: f64,
    pub total_impressions: f64,
    pub query_count: usize,
    /// Highest-click queries, at most ten
    pub top_queries: Vec<PageQuery>,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Group values by key keeping first-appearance order, so ties sort deterministically.
fn group_by<'a, K, F>(rows: &'a [CombinedRow], key: F) -> Vec<(K, Vec<&'a CombinedRow>)>
where
    K: std::hash::Hash + Eq + Clone,
    F: Fn(&'a CombinedRow) -> K,
{
    let mut groups: Vec<(K, Vec<&CombinedRow>)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for row in rows {
        let k = key(row);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![row]));
            }
        }
    }
    groups
}

/// Queries ranked by revenue attributed to them across every page they land on.
pub fn revenue_queries(rows: &[CombinedRow], limit: usize) -> Vec<QueryRevenue> {
    let mut queries: Vec<QueryRevenue> = group_by(rows, |r| r.query.as_str())
        .into_iter()
        .map(|(query, group)| {
            let mut summary = QueryRevenue {
                query: query.to_string(),
                page_count: group.len(),
                ..QueryRevenue::default()
            };
            let mut position_sum = 0.0;
            for row in &group {
                summary.total_attributed_revenue += row.attributed_revenue;
                summary.total_attributed_conversions += row.attributed_conversions;
                summary.total_attributed_transactions += row.attributed_transactions;
                summary.total_clicks += row.clicks;
                summary.total_impressions += row.impressions;
                position_sum += row.position;
            }
            summary.avg_position = ratio(position_sum, group.len() as f64);
            summary.avg_ctr = ratio(summary.total_clicks, summary.total_impressions);
            summary
        })
        .collect();

    queries.sort_by(|a, b| b.total_attributed_revenue.total_cmp(&a.total_attributed_revenue));
    queries.truncate(limit);
    queries
}

/// Roll rows up by page category, highest attributed revenue first.
pub fn category_performance(rows: &[CombinedRow], table: &CategoryTable) -> Vec<CategoryPerformance> {
    let mut categories: Vec<CategoryPerformance> = group_by(rows, |r| table.classify(&r.page).to_string())
        .into_iter()
        .map(|(category, group)| {
            let mut perf = CategoryPerformance {
                category,
                ..CategoryPerformance::default()
            };
            let mut pages = HashSet::new();
            let mut queries = HashSet::new();
            for row in &group {
                perf.clicks += row.clicks;
                perf.impressions += row.impressions;
                perf.attributed_revenue += row.attributed_revenue;
                perf.attributed_conversions += row.attributed_conversions;
                perf.attributed_transactions += row.attributed_transactions;
                pages.insert(row.page.as_str());
                queries.insert(row.query.as_str());
            }
            perf.ctr = ratio(perf.clicks, perf.impressions);
            perf.page_count = pages.len();
            perf.query_count = queries.len();
            perf
        })
        .collect();

    categories.sort_by(|a, b| b.attributed_revenue.total_cmp(&a.attributed_revenue));
    categories
}

/// Well-ranked queries that bring real traffic to pages earning nothing.
///
/// Score favors more clicks and a better (lower) position.
pub fn content_opportunities(rows: &[CombinedRow], limit: Option<usize>) -> Vec<ContentOpportunity> {
    let mut opportunities: Vec<ContentOpportunity> = rows
        .iter()
        .filter(|r| {
            r.clicks >= OPPORTUNITY_MIN_CLICKS
                && r.attributed_revenue == 0.0
                && r.position <= OPPORTUNITY_MAX_POSITION
        })
        .map(|r| ContentOpportunity {
            query: r.query.clone(),
            page: r.page.clone(),
            page_full: r.page_full.clone(),
            clicks: r.clicks,
            impressions: r.impressions,
            ctr: r.ctr,
            position: r.position,
            page_sessions: r.page_sessions,
            opportunity_score: r.clicks * (1.0 - r.position / OPPORTUNITY_MAX_POSITION),
        })
        .collect();

    opportunities.sort_by(|a, b| b.opportunity_score.total_cmp(&a.opportunity_score));
    if let Some(limit) = limit {
        opportunities.truncate(limit);
    }
    opportunities
}

/// One entry per page with its outcomes and top queries, highest revenue first.
pub fn page_summary(rows: &[CombinedRow]) -> Vec<PageSummary> {
    let mut pages: Vec<PageSummary> = group_by(rows, |r| r.page.as_str())
        .into_iter()
        .map(|(page, group)| {
            let first = group[0];
            let mut queries: Vec<PageQuery> = group
                .iter()
                .map(|r| PageQuery {
                    query: r.query.clone(),
                    clicks: r.clicks,
                    impressions: r.impressions,
                    position: r.position,
                })
                .collect();
            queries.sort_by(|a, b| b.clicks.total_cmp(&a.clicks));
            let total_clicks = queries.iter().map(|q| q.clicks).sum();
            let total_impressions = queries.iter().map(|q| q.impressions).sum();
            let query_count = queries.len();
            queries.truncate(PAGE_SUMMARY_TOP_QUERIES);

            PageSummary {
                page: page.to_string(),
                page_full: first.page_full.clone(),
                page_sessions: first.page_sessions,
                page_conversions: first.page_conversions,
                page_revenue: first.page_revenue,
                page_transactions: first.page_transactions,
                conversion_rate: first.conversion_rate,
                total_clicks,
                total_impressions,
                query_count,
                top_queries: queries,
            }
        })
        .collect();

    pages.sort_by(|a, b| b.page_revenue.total_cmp(&a.page_revenue));
    pages
}
