//! Threshold filtering of expanded keywords.

use tracing::info;

use kwplanner_shared::{AppConfig, ExpandedKeyword};

/// Thresholds a keyword must satisfy to be kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    pub min_search_volume: u64,
    pub max_cpc: f64,
    pub max_competition: f64,
    /// Case-insensitive substrings; a keyword containing any of them is dropped.
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_search_volume: 10,
            max_cpc: 100.0,
            max_competition: 1.0,
            exclude_patterns: Vec::new(),
        }
    }
}

impl From<&AppConfig> for FilterCriteria {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_search_volume: config.filters.min_search_volume,
            max_cpc: config.filters.max_cpc,
            max_competition: config.filters.max_competition,
            exclude_patterns: config.filters.exclude_patterns.clone(),
        }
    }
}

impl FilterCriteria {
    /// Whether `keyword` survives every check.
    pub fn accepts(&self, keyword: &ExpandedKeyword) -> bool {
        if keyword.search_volume < self.min_search_volume {
            return false;
        }
        if keyword.cpc > self.max_cpc {
            return false;
        }
        if keyword.competition > self.max_competition {
            return false;
        }
        let term = keyword.keyword.to_lowercase();
        !self
            .exclude_patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .any(|p| !p.is_empty() && term.contains(&p))
    }
}

/// Keep keywords that pass `criteria`, preserving order.
pub fn filter_keywords(keywords: Vec<ExpandedKeyword>, criteria: &FilterCriteria) -> Vec<ExpandedKeyword> {
    let before = keywords.len();
    let kept: Vec<ExpandedKeyword> = keywords.into_iter().filter(|k| criteria.accepts(k)).collect();
    info!(
        before,
        after = kept.len(),
        removed = before - kept.len(),
        "filtered keywords"
    );
    kept
}
