//! Shared types, error model, and configuration for the keyword planner.
//!
//! This crate is the foundation depended on by all other kwplanner crates.
//! It provides:
//! - [`KwPlannerError`] and [`RequestError`], the unified error types
//! - Domain types ([`Keyword`], [`ExpandedKeyword`], [`Location`], [`AdGroup`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdGroupConfig, AppConfig, AuthMode, CacheConfig, DefaultsConfig, EndpointsConfig,
    FilterConfig, GatewayConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate_config, validate_credentials,
};
pub use error::{KwPlannerError, RequestError, Result};
pub use types::{
    AdGroup, AdGroupKeyword, AdGroupMetadata, AdGroupStatus, CategoryRule, DEFAULT_CATEGORY,
    ExpandedKeyword, Keyword, KeywordSuggestion, Location, LocationPatterns, LocationType,
    MAX_TERM_CHARS, MAX_TERMS_PER_REQUEST, MatchType, Metrics, Platform, SeedKeyword,
    normalize_term, round2, validate_term,
};
