//! Ad-group construction and size balancing.
//!
//! Keywords are grouped by category, location and (optionally) search intent. With
//! balancing on, oversized groups are split into volume-ranked chunks and undersized
//! groups are merged by the first word of their key; whatever is still too small ends
//! up in a single catch-all group. Each resulting group is then materialized once per
//! requested match type.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use kwplanner_shared::{
    AdGroup, AdGroupKeyword, AdGroupMetadata, AdGroupStatus, AppConfig, Keyword, KwPlannerError,
    MatchType, Result,
};

use crate::bids::{default_group_bid, group_averages, keyword_bid};

/// Key used when a keyword has no category, location or intent.
pub const GENERAL_GROUP: &str = "General";

/// Name of the group collecting leftovers that could not be merged.
pub const CATCH_ALL_GROUP: &str = "General - Small Groups";

/// Metadata entry read for intent grouping.
pub const SEARCH_INTENT_KEY: &str = "search_intent";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Size bounds and output settings for ad-group creation.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOptions {
    pub min_keywords: usize,
    pub max_keywords: usize,
    pub optimal_keywords: usize,
    /// One ad group is produced per group and match type. Empty means broad only.
    pub match_types: Vec<MatchType>,
    pub group_by_intent: bool,
    /// Split and merge groups to fit the bounds.
    pub balance: bool,
    pub campaign_name: String,
    /// Warn when the catch-all group ends up below `min_keywords`.
    pub warn_small_catch_all: bool,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        Self {
            min_keywords: 3,
            max_keywords: 50,
            optimal_keywords: 15,
            match_types: vec![MatchType::Broad],
            group_by_intent: true,
            balance: true,
            campaign_name: "Campaign".into(),
            warn_small_catch_all: true,
        }
    }
}

impl From<&AppConfig> for BalanceOptions {
    fn from(config: &AppConfig) -> Self {
        let ag = &config.ad_groups;
        Self {
            min_keywords: ag.min_keywords,
            max_keywords: ag.max_keywords,
            optimal_keywords: ag.optimal_keywords,
            match_types: ag.match_types.clone(),
            group_by_intent: ag.group_by_intent,
            balance: ag.balance,
            campaign_name: ag.campaign_name.clone(),
            warn_small_catch_all: ag.warn_small_catch_all,
        }
    }
}

impl BalanceOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_keywords == 0 || self.optimal_keywords == 0 {
            return Err(KwPlannerError::validation(
                "min_keywords and optimal_keywords must be at least 1",
            ));
        }
        if self.min_keywords > self.max_keywords {
            return Err(KwPlannerError::validation(format!(
                "min_keywords ({}) exceeds max_keywords ({})",
                self.min_keywords, self.max_keywords
            )));
        }
        if self.optimal_keywords > self.max_keywords {
            return Err(KwPlannerError::validation(format!(
                "optimal_keywords ({}) exceeds max_keywords ({})",
                self.optimal_keywords, self.max_keywords
            )));
        }
        Ok(())
    }

    fn effective_match_types(&self) -> Vec<MatchType> {
        if self.match_types.is_empty() {
            vec![MatchType::Broad]
        } else {
            self.match_types.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// `category - location - intent`, skipping empty parts.
pub fn group_key(keyword: &Keyword, group_by_intent: bool) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(category) = keyword.category.as_deref().map(str::trim) {
        if !category.is_empty() {
            parts.push(category);
        }
    }
    if let Some(location) = keyword.location.as_deref().map(str::trim) {
        if !location.is_empty() {
            parts.push(location);
        }
    }
    if group_by_intent {
        if let Some(intent) = keyword.metadata.get(SEARCH_INTENT_KEY).map(|s| s.trim()) {
            if !intent.is_empty() {
                parts.push(intent);
            }
        }
    }
    if parts.is_empty() {
        GENERAL_GROUP.to_string()
    } else {
        parts.join(" - ")
    }
}

/// Group keywords by [`group_key`], in first-seen order.
pub fn group_keywords(keywords: &[Keyword], group_by_intent: bool) -> IndexMap<String, Vec<Keyword>> {
    let mut groups: IndexMap<String, Vec<Keyword>> = IndexMap::new();
    for keyword in keywords {
        groups
            .entry(group_key(keyword, group_by_intent))
            .or_default()
            .push(keyword.clone());
    }
    debug!(groups = groups.len(), "grouped keywords");
    groups
}

/// Sort by volume (highest first) and cut into chunks of `optimal` named `"{key} #n"`.
pub fn split_by_volume(key: &str, mut keywords: Vec<Keyword>, optimal: usize) -> Vec<(String, Vec<Keyword>)> {
    let optimal = optimal.max(1);
    keywords.sort_by(|a, b| b.search_volume().cmp(&a.search_volume()));
    keywords
        .chunks(optimal)
        .enumerate()
        .map(|(i, chunk)| (format!("{key} #{}", i + 1), chunk.to_vec()))
        .collect()
}

// ---------------------------------------------------------------------------
// Balancing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BalancedGroup {
    name: String,
    keywords: Vec<Keyword>,
    /// Fixed from the group the keywords came from before any split.
    default_bid: f64,
    is_catch_all: bool,
}

impl BalancedGroup {
    fn new(name: String, keywords: Vec<Keyword>) -> Self {
        let default_bid = bid_for(&keywords);
        Self {
            name,
            keywords,
            default_bid,
            is_catch_all: false,
        }
    }
}

fn bid_for(keywords: &[Keyword]) -> f64 {
    let (avg_cpc, avg_competition) = group_averages(keywords);
    default_group_bid(avg_cpc, avg_competition)
}

fn balance_groups(groups: IndexMap<String, Vec<Keyword>>, options: &BalanceOptions) -> Vec<BalancedGroup> {
    let mut balanced = Vec::with_capacity(groups.len());

    for (key, keywords) in groups {
        let size = keywords.len();
        if size > options.max_keywords {
            let default_bid = bid_for(&keywords);
            let chunks = split_by_volume(&key, keywords, options.optimal_keywords);
            debug!(group = %key, size, chunks = chunks.len(), "split oversized group");
            balanced.extend(chunks.into_iter().map(|(name, keywords)| BalancedGroup {
                name,
                keywords,
                default_bid,
                is_catch_all: false,
            }));
        } else {
            if size < options.min_keywords {
                warn!(
                    group = %key,
                    size,
                    min = options.min_keywords,
                    "ad group is below the minimum size"
                );
            }
            balanced.push(BalancedGroup::new(key, keywords));
        }
    }

    merge_small_groups(balanced, options)
}

fn merge_small_groups(groups: Vec<BalancedGroup>, options: &BalanceOptions) -> Vec<BalancedGroup> {
    let (mut kept, small): (Vec<_>, Vec<_>) = groups
        .into_iter()
        .partition(|g| g.keywords.len() >= options.min_keywords);
    if small.is_empty() {
        return kept;
    }

    let mut buckets: IndexMap<String, Vec<Keyword>> = IndexMap::new();
    for group in small {
        let word = group.name.split_whitespace().next().unwrap_or("Other").to_string();
        buckets.entry(word).or_default().extend(group.keywords);
    }

    let mut leftovers = Vec::new();
    for (word, keywords) in buckets {
        if keywords.len() < options.min_keywords {
            leftovers.extend(keywords);
            continue;
        }

        let name = format!("{word} - Merged");
        info!(group = %name, keywords = keywords.len(), "merged small groups");
        if keywords.len() <= options.max_keywords {
            kept.push(BalancedGroup::new(name, keywords));
            continue;
        }

        let default_bid = bid_for(&keywords);
        for (chunk_name, chunk) in split_by_volume(&name, keywords, options.optimal_keywords) {
            if chunk.len() < options.min_keywords {
                leftovers.extend(chunk);
            } else {
                kept.push(BalancedGroup {
                    name: chunk_name,
                    keywords: chunk,
                    default_bid,
                    is_catch_all: false,
                });
            }
        }
    }

    if !leftovers.is_empty() {
        if leftovers.len() < options.min_keywords && options.warn_small_catch_all {
            warn!(
                group = CATCH_ALL_GROUP,
                size = leftovers.len(),
                min = options.min_keywords,
                "catch-all group is below the minimum size"
            );
        }
        let mut catch_all = BalancedGroup::new(CATCH_ALL_GROUP.to_string(), leftovers);
        catch_all.is_catch_all = true;
        kept.push(catch_all);
    }
    kept
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// Strip characters ad platforms reject in names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn group_metadata(keywords: &[Keyword]) -> AdGroupMetadata {
    let (avg_cpc, avg_competition) = group_averages(keywords);
    AdGroupMetadata {
        total_volume: keywords.iter().map(Keyword::search_volume).sum(),
        avg_competition,
        avg_cpc,
        keyword_count: keywords.len(),
    }
}

fn materialize(group: &BalancedGroup, match_type: MatchType, options: &BalanceOptions) -> AdGroup {
    let keywords = group
        .keywords
        .iter()
        .map(|source| {
            let mut keyword = source.clone();
            keyword.match_type = match_type;
            AdGroupKeyword {
                bid: keyword_bid(&keyword),
                keyword,
                final_url: None,
            }
        })
        .collect();

    AdGroup {
        name: sanitize_name(&format!("{} - {}", group.name, match_type.label())),
        campaign_name: options.campaign_name.clone(),
        keywords,
        default_bid: group.default_bid,
        status: AdGroupStatus::Enabled,
        metadata: group_metadata(&group.keywords),
        is_catch_all: group.is_catch_all,
    }
}

/// Build ad groups from `keywords`.
///
/// Returns a `Validation` error for inconsistent size bounds. No keywords yields no
/// groups.
pub fn create_ad_groups(keywords: &[Keyword], options: &BalanceOptions) -> Result<Vec<AdGroup>> {
    options.validate()?;
    if keywords.is_empty() {
        warn!("no keywords to build ad groups from");
        return Ok(Vec::new());
    }

    let match_types = options.effective_match_types();
    let groups = group_keywords(keywords, options.group_by_intent);
    let balanced = if options.balance {
        balance_groups(groups, options)
    } else {
        groups
            .into_iter()
            .map(|(name, keywords)| BalancedGroup::new(name, keywords))
            .collect()
    };

    let ad_groups: Vec<AdGroup> = balanced
        .iter()
        .flat_map(|group| {
            match_types
                .iter()
                .map(move |match_type| materialize(group, *match_type, options))
        })
        .collect();

    info!(
        keywords = keywords.len(),
        groups = balanced.len(),
        ad_groups = ad_groups.len(),
        "created ad groups"
    );
    Ok(ad_groups)
}
