//! Core domain types for keyword planning: keywords, metrics, locations and ad groups.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{KwPlannerError, Result};

/// Maximum length of a normalized keyword term, in characters.
pub const MAX_TERM_CHARS: usize = 500;

/// Most terms a single suggestion or metrics request may carry.
pub const MAX_TERMS_PER_REQUEST: usize = 1000;

/// Category assigned to keywords nothing more specific applies to.
pub const DEFAULT_CATEGORY: &str = "general";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trim, lower-case and collapse internal whitespace runs to a single space.
pub fn normalize_term(raw: &str) -> String {
    WHITESPACE_RE
        .replace_all(raw.trim(), " ")
        .to_lowercase()
}

/// Normalize a term and enforce the 1..=500 character bound.
pub fn validate_term(raw: &str) -> Result<String> {
    let term = normalize_term(raw);
    if term.is_empty() {
        return Err(KwPlannerError::validation("keyword term must not be empty"));
    }
    let len = term.chars().count();
    if len > MAX_TERM_CHARS {
        return Err(KwPlannerError::validation(format!(
            "keyword term is {len} characters, maximum is {MAX_TERM_CHARS}"
        )));
    }
    Ok(term)
}

/// Round a money amount to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Target advertising platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    GoogleAds,
    BingAds,
}

impl Platform {
    /// Canonical identifier, also used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleAds => "google_ads",
            Self::BingAds => "bing_ads",
        }
    }

    /// Path segment used when building endpoint URLs.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::GoogleAds => "google_ads",
            Self::BingAds => "bing",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = KwPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google_ads" | "google" => Ok(Self::GoogleAds),
            "bing_ads" | "bing" => Ok(Self::BingAds),
            other => Err(KwPlannerError::validation(format!(
                "unknown platform '{other}' (expected google_ads or bing_ads)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MatchType
// ---------------------------------------------------------------------------

/// Keyword matching strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Broad,
    Phrase,
    Exact,
    BroadModifier,
}

impl MatchType {
    pub const ALL: [MatchType; 4] = [
        MatchType::Broad,
        MatchType::Phrase,
        MatchType::Exact,
        MatchType::BroadModifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broad => "broad",
            Self::Phrase => "phrase",
            Self::Exact => "exact",
            Self::BroadModifier => "broad_modifier",
        }
    }

    /// Human-readable label used in ad-group names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Broad => "Broad",
            Self::Phrase => "Phrase",
            Self::Exact => "Exact",
            Self::BroadModifier => "Broad Modifier",
        }
    }

    /// Render a term in the notation ad platforms use on import.
    pub fn format_term(&self, term: &str) -> String {
        match self {
            Self::Broad => term.to_string(),
            Self::Phrase => format!("\"{term}\""),
            Self::Exact => format!("[{term}]"),
            Self::BroadModifier => term
                .split_whitespace()
                .map(|word| format!("+{word}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = KwPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        MatchType::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| KwPlannerError::validation(format!("unknown match type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Metrics & Keyword
// ---------------------------------------------------------------------------

/// Search metrics for a keyword. Any subset of fields may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<f64>,
}

impl Metrics {
    /// Validate ranges and round cpc to cents.
    pub fn new(search_volume: Option<u64>, cpc: Option<f64>, competition: Option<f64>) -> Result<Self> {
        if let Some(c) = cpc {
            if !c.is_finite() || c < 0.0 {
                return Err(KwPlannerError::validation(format!("cpc must be >= 0, got {c}")));
            }
        }
        if let Some(c) = competition {
            if !(0.0..=1.0).contains(&c) {
                return Err(KwPlannerError::validation(format!(
                    "competition must be within 0..1, got {c}"
                )));
            }
        }
        Ok(Self {
            search_volume,
            cpc: cpc.map(round2),
            competition,
        })
    }
}

/// A keyword as consumed by the ad-group balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Free-form annotations; `search_intent` is used for grouping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

fn default_language() -> String {
    "en".into()
}

impl Keyword {
    pub fn new(term: &str) -> Result<Self> {
        Ok(Self {
            term: validate_term(term)?,
            match_type: MatchType::Broad,
            metrics: None,
            category: None,
            location: None,
            language: default_language(),
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn search_volume(&self) -> u64 {
        self.metrics.and_then(|m| m.search_volume).unwrap_or(0)
    }

    pub fn cpc(&self) -> Option<f64> {
        self.metrics.and_then(|m| m.cpc)
    }

    pub fn competition(&self) -> Option<f64> {
        self.metrics.and_then(|m| m.competition)
    }

    /// The term rendered in this keyword's match-type notation.
    pub fn formatted(&self) -> String {
        self.match_type.format_term(&self.term)
    }
}

// ---------------------------------------------------------------------------
// Seeds & suggestions
// ---------------------------------------------------------------------------

/// A user-supplied starting term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedKeyword {
    pub term: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.into()
}

impl SeedKeyword {
    pub fn new(term: &str, category: impl Into<String>) -> Result<Self> {
        Ok(Self {
            term: validate_term(term)?,
            category: category.into(),
        })
    }

    /// Normalized term, re-validated for seeds that came in through deserialization.
    pub fn normalized_term(&self) -> Result<String> {
        validate_term(&self.term)
    }
}

/// One record returned by a suggestion or metrics source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeywordSuggestion {
    pub keyword: String,
    #[serde(default, alias = "searchVolume", alias = "volume")]
    pub search_volume: Option<u64>,
    #[serde(default)]
    pub competition: Option<f64>,
    /// Bing reports the suggested bid as `bid`.
    #[serde(default, alias = "bid")]
    pub cpc: Option<f64>,
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Geographic target for keyword combination.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, alias = "zip", skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
}

impl Location {
    /// Build a normalized location. At least one field must be non-empty.
    pub fn new(city: Option<&str>, state: Option<&str>, zip_code: Option<&str>) -> Result<Self> {
        let city = non_empty(city).map(str::to_string);
        let state = non_empty(state).map(|s| {
            if s.chars().count() == 2 {
                s.to_uppercase()
            } else {
                s.to_string()
            }
        });
        let zip_code = non_empty(zip_code).map(clean_zip).filter(|z| !z.is_empty());

        if city.is_none() && state.is_none() && zip_code.is_none() {
            return Err(KwPlannerError::validation(
                "location needs at least one of city, state or zip code",
            ));
        }
        Ok(Self {
            city,
            state,
            zip_code,
        })
    }

    /// Re-run normalization on a deserialized record.
    pub fn normalized(&self) -> Result<Self> {
        Self::new(
            self.city.as_deref(),
            self.state.as_deref(),
            self.zip_code.as_deref(),
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn clean_zip(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.len() == 9 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}", &cleaned[..5], &cleaned[5..])
    } else {
        cleaned
    }
}

/// Which combination pattern produced a location-specific keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    City,
    CityState,
    Zip,
    NearZip,
    NearMe,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::CityState => "city_state",
            Self::Zip => "zip",
            Self::NearZip => "near_zip",
            Self::NearMe => "near_me",
        }
    }
}

/// Templates for combining a keyword `{keyword}` with a location.
///
/// Placeholders: `{keyword}`, `{city}`, `{state}`, `{zip}`. An empty template disables
/// that combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPatterns {
    #[serde(default = "default_city_pattern")]
    pub city: String,
    #[serde(default = "default_city_state_pattern")]
    pub city_state: String,
    #[serde(default = "default_zip_pattern")]
    pub zip: String,
    #[serde(default = "default_near_zip_pattern")]
    pub near_zip: String,
    #[serde(default = "default_near_me_pattern")]
    pub near_me: String,
}

impl Default for LocationPatterns {
    fn default() -> Self {
        Self {
            city: default_city_pattern(),
            city_state: default_city_state_pattern(),
            zip: default_zip_pattern(),
            near_zip: default_near_zip_pattern(),
            near_me: default_near_me_pattern(),
        }
    }
}

fn default_city_pattern() -> String {
    "{keyword} in {city}".into()
}
fn default_city_state_pattern() -> String {
    "{keyword} {city} {state}".into()
}
fn default_zip_pattern() -> String {
    "{keyword} {zip}".into()
}
fn default_near_zip_pattern() -> String {
    "{keyword} near {zip}".into()
}
fn default_near_me_pattern() -> String {
    "{keyword} near me".into()
}

// ---------------------------------------------------------------------------
// ExpandedKeyword
// ---------------------------------------------------------------------------

/// A keyword derived from a seed, with provenance and targeting context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedKeyword {
    pub keyword: String,
    pub seed_keyword: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub platform: Platform,
    pub location_code: u32,
    pub language_code: String,
    #[serde(default)]
    pub search_volume: u64,
    #[serde(default)]
    pub competition: f64,
    #[serde(default)]
    pub cpc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<LocationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_value: Option<String>,
}

impl ExpandedKeyword {
    /// Convert to a balancer keyword. A zero cpc is reported as "no cpc data".
    pub fn to_keyword(&self) -> Keyword {
        Keyword {
            term: self.keyword.clone(),
            match_type: MatchType::Broad,
            metrics: Some(Metrics {
                search_volume: Some(self.search_volume),
                cpc: (self.cpc > 0.0).then_some(round2(self.cpc)),
                competition: Some(self.competition),
            }),
            category: Some(self.category.clone()),
            location: self.location_value.clone(),
            language: self.language_code.clone(),
            metadata: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// An ordered categorization rule: the first rule with a matching pattern wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdGroup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdGroupStatus {
    #[default]
    Draft,
    Enabled,
    Paused,
    Removed,
}

/// A keyword placed in an ad group, with its suggested bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdGroupKeyword {
    pub keyword: Keyword,
    /// `None` means the group's default bid applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Aggregates computed from the group's source keywords.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdGroupMetadata {
    pub total_volume: u64,
    pub avg_competition: f64,
    pub avg_cpc: f64,
    pub keyword_count: usize,
}

/// A named bucket of keywords sharing bidding and targeting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdGroup {
    pub name: String,
    pub campaign_name: String,
    pub keywords: Vec<AdGroupKeyword>,
    pub default_bid: f64,
    #[serde(default)]
    pub status: AdGroupStatus,
    pub metadata: AdGroupMetadata,
    /// Set on the shared bucket of leftovers that may be smaller than the minimum.
    #[serde(default)]
    pub is_catch_all: bool,
}
