//! Summaries and consistency checks over built ad groups.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use kwplanner_shared::{AdGroup, round2};

use crate::balancer::BalanceOptions;

/// Min, max and mean of the keyword bids that are set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BidRange {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Group counts per size band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SizeDistribution {
    /// Below `min_keywords`.
    pub small: usize,
    /// `min_keywords..=optimal_keywords`.
    pub optimal: usize,
    /// Above `optimal_keywords`, up to `max_keywords`.
    pub large: usize,
    /// Above `max_keywords`.
    pub oversized: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AdGroupStatistics {
    pub total_ad_groups: usize,
    pub total_keywords: usize,
    /// Rounded to one decimal.
    pub avg_keywords_per_group: f64,
    /// Ad groups per match type.
    pub match_type_distribution: BTreeMap<String, usize>,
    pub bid_range: BidRange,
    pub size_distribution: SizeDistribution,
}

/// Aggregate figures for a set of ad groups.
pub fn ad_group_statistics(groups: &[AdGroup], options: &BalanceOptions) -> AdGroupStatistics {
    if groups.is_empty() {
        return AdGroupStatistics::default();
    }

    let total_keywords: usize = groups.iter().map(|g| g.keywords.len()).sum();
    let avg = total_keywords as f64 / groups.len() as f64;

    let mut match_type_distribution = BTreeMap::new();
    for group in groups {
        if let Some(first) = group.keywords.first() {
            *match_type_distribution
                .entry(first.keyword.match_type.as_str().to_string())
                .or_insert(0) += 1;
        }
    }

    let bids: Vec<f64> = groups
        .iter()
        .flat_map(|g| g.keywords.iter().filter_map(|k| k.bid))
        .collect();
    let bid_range = if bids.is_empty() {
        BidRange::default()
    } else {
        BidRange {
            min: bids.iter().copied().fold(f64::INFINITY, f64::min),
            max: bids.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg: round2(bids.iter().sum::<f64>() / bids.len() as f64),
        }
    };

    let mut size_distribution = SizeDistribution::default();
    for group in groups {
        let size = group.keywords.len();
        if size < options.min_keywords {
            size_distribution.small += 1;
        } else if size <= options.optimal_keywords {
            size_distribution.optimal += 1;
        } else if size <= options.max_keywords {
            size_distribution.large += 1;
        } else {
            size_distribution.oversized += 1;
        }
    }

    AdGroupStatistics {
        total_ad_groups: groups.len(),
        total_keywords,
        avg_keywords_per_group: (avg * 10.0).round() / 10.0,
        match_type_distribution,
        bid_range,
        size_distribution,
    }
}

/// A problem found by [`validate_ad_groups`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    DuplicateName { name: String },
    TooSmall { group: String, size: usize, min: usize },
    TooLarge { group: String, size: usize, max: usize },
    DuplicateKeyword { group: String, term: String },
    MissingBid { group: String, term: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "duplicate ad group name '{name}'"),
            Self::TooSmall { group, size, min } => {
                write!(f, "ad group '{group}' has {size} keywords (minimum {min})")
            }
            Self::TooLarge { group, size, max } => {
                write!(f, "ad group '{group}' has {size} keywords (maximum {max})")
            }
            Self::DuplicateKeyword { group, term } => {
                write!(f, "ad group '{group}' contains '{term}' more than once")
            }
            Self::MissingBid { group, term } => write!(
                f,
                "keyword '{term}' in ad group '{group}' has no bid and the group has no default bid"
            ),
        }
    }
}

/// Check ad groups against the size bounds and for duplicates.
///
/// The catch-all group is exempt from the minimum size.
pub fn validate_ad_groups(groups: &[AdGroup], options: &BalanceOptions) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut names = HashSet::new();

    for group in groups {
        if !names.insert(group.name.as_str()) {
            issues.push(ValidationIssue::DuplicateName {
                name: group.name.clone(),
            });
        }

        let size = group.keywords.len();
        if size < options.min_keywords && !group.is_catch_all {
            issues.push(ValidationIssue::TooSmall {
                group: group.name.clone(),
                size,
                min: options.min_keywords,
            });
        }
        if size > options.max_keywords {
            issues.push(ValidationIssue::TooLarge {
                group: group.name.clone(),
                size,
                max: options.max_keywords,
            });
        }

        let mut terms = HashSet::new();
        for entry in &group.keywords {
            let term = entry.keyword.term.as_str();
            if !terms.insert(term) {
                issues.push(ValidationIssue::DuplicateKeyword {
                    group: group.name.clone(),
                    term: term.to_string(),
                });
            }
            if entry.bid.is_none() && group.default_bid <= 0.0 {
                issues.push(ValidationIssue::MissingBid {
                    group: group.name.clone(),
                    term: term.to_string(),
                });
            }
        }
    }

    issues
}
