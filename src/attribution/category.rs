use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::DEFAULT_CATEGORY;
use crate::error::Result;
use crate::types::CategoryRule;

/// Built-in page classification, checked top to bottom
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("homepage", r"^/(\?.*)?$"),
    ("product", r"^/products?/"),
    ("collection", r"^/(collections?|categor(y|ies)|shop)(/|$)"),
    ("blog", r"^/(blog|news|articles?|guides?)(/|$)"),
    ("cart_checkout", r"^/(cart|checkout)(/|$)"),
    ("account", r"^/(account|login|register)(/|$)"),
    ("support", r"^/(pages/)?(faq|help|support|contact|shipping|returns)(/|$)"),
];

static DEFAULT_TABLE: Lazy<CategoryTable> = Lazy::new(|| {
    let rules: Vec<CategoryRule> = DEFAULT_RULES
        .iter()
        .map(|(name, pattern)| CategoryRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
        })
        .collect();
    CategoryTable::from_rules(&rules).expect("built-in category patterns compile")
});

/// Ordered regex table mapping page paths to a category name; first match wins.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    rules: Vec<(String, Regex)>,
}

impl CategoryTable {
    pub fn from_rules(rules: &[CategoryRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<(String, Regex)> {
                Ok((rule.name.clone(), Regex::new(&rule.pattern)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Configured rules when present, else the built-in table
    pub fn from_config(rules: &[CategoryRule]) -> Result<Self> {
        if rules.is_empty() {
            Ok(Self::default())
        } else {
            Self::from_rules(rules)
        }
    }

    pub fn classify(&self, page: &str) -> &str {
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(page))
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_CATEGORY)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}
