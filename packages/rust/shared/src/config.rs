//! Application configuration for the keyword planner.
//!
//! User config lives at `~/.kwplanner/kwplanner.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KwPlannerError, Result};
use crate::types::{CategoryRule, LocationPatterns, MAX_TERMS_PER_REQUEST, MatchType, Platform};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kwplanner.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kwplanner";

// ---------------------------------------------------------------------------
// Config structs (matching kwplanner.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub ad_groups: AdGroupConfig,

    /// Location combination templates.
    #[serde(default)]
    pub locations: LocationPatterns,

    /// Ordered categorization rules. Empty means the built-in rule list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryRule>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub platform: Platform,

    /// Numeric geo target (2840 is the United States).
    #[serde(default = "default_location_code")]
    pub location_code: u32,

    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Emit each seed term alongside its suggestions.
    #[serde(default = "default_true")]
    pub include_seed: bool,

    /// Terms per metrics request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on keywords carried into categorization and grouping.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            location_code: default_location_code(),
            language_code: default_language_code(),
            include_seed: true,
            batch_size: default_batch_size(),
            max_keywords: default_max_keywords(),
        }
    }
}

fn default_location_code() -> u32 {
    2840
}
fn default_language_code() -> String {
    "en".into()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_keywords() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

/// How credentials are attached to outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Basic,
    Bearer,
    ApiKey,
    None,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Process-wide bound on in-flight requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    #[serde(default)]
    pub auth: AuthMode,

    /// Names of env vars holding credentials (never store secrets here).
    #[serde(default = "default_login_env")]
    pub login_env: String,

    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Header carrying the key when `auth = "api_key"`; the key itself comes from `token_env`.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
            auth: AuthMode::default(),
            login_env: default_login_env(),
            password_env: default_password_env(),
            token_env: default_token_env(),
            api_key_header: default_api_key_header(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.dataforseo.com/v3/".into()
}
fn default_max_concurrent() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.1
}
fn default_login_env() -> String {
    "KWPLANNER_LOGIN".into()
}
fn default_password_env() -> String {
    "KWPLANNER_PASSWORD".into()
}
fn default_token_env() -> String {
    "KWPLANNER_TOKEN".into()
}
fn default_api_key_header() -> String {
    "X-API-Key".into()
}

/// `[gateway.endpoints]` section. `{platform}` is replaced with the platform slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_suggestions_endpoint")]
    pub suggestions: String,

    #[serde(default = "default_metrics_endpoint")]
    pub metrics: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            suggestions: default_suggestions_endpoint(),
            metrics: default_metrics_endpoint(),
        }
    }
}

fn default_suggestions_endpoint() -> String {
    "keywords/{platform}/suggestions".into()
}
fn default_metrics_endpoint() -> String {
    "keywords/{platform}/metrics".into()
}

impl EndpointsConfig {
    /// Suggestions path for a platform.
    pub fn suggestions_path(&self, platform: Platform) -> String {
        self.suggestions.replace("{platform}", platform.slug())
    }

    /// Metrics path for a platform.
    pub fn metrics_path(&self, platform: Platform) -> String {
        self.metrics.replace("{platform}", platform.slug())
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fail the run when the cache directory is unusable instead of running uncached.
    #[serde(default)]
    pub required: bool,

    /// Cache directory. A leading `~/` is resolved against the home directory.
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_cache_dir() -> String {
    "~/.kwplanner/cache".into()
}
fn default_ttl_hours() -> u64 {
    24
}

impl CacheConfig {
    /// The cache directory with `~/` expanded.
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        expand_home(&self.dir)
    }
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_search_volume")]
    pub min_search_volume: u64,

    #[serde(default = "default_max_cpc")]
    pub max_cpc: f64,

    #[serde(default = "default_max_competition")]
    pub max_competition: f64,

    /// Case-insensitive substrings that exclude a keyword.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_search_volume: default_min_search_volume(),
            max_cpc: default_max_cpc(),
            max_competition: default_max_competition(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_min_search_volume() -> u64 {
    10
}
fn default_max_cpc() -> f64 {
    100.0
}
fn default_max_competition() -> f64 {
    1.0
}

/// `[ad_groups]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdGroupConfig {
    #[serde(default = "default_min_group")]
    pub min_keywords: usize,

    #[serde(default = "default_max_group")]
    pub max_keywords: usize,

    #[serde(default = "default_optimal_group")]
    pub optimal_keywords: usize,

    #[serde(default = "default_match_types")]
    pub match_types: Vec<MatchType>,

    #[serde(default = "default_true")]
    pub group_by_intent: bool,

    #[serde(default = "default_true")]
    pub balance: bool,

    #[serde(default = "default_campaign_name")]
    pub campaign_name: String,

    /// Warn when the shared small-groups bucket ends up below `min_keywords`.
    #[serde(default = "default_true")]
    pub warn_small_catch_all: bool,
}

impl Default for AdGroupConfig {
    fn default() -> Self {
        Self {
            min_keywords: default_min_group(),
            max_keywords: default_max_group(),
            optimal_keywords: default_optimal_group(),
            match_types: default_match_types(),
            group_by_intent: true,
            balance: true,
            campaign_name: default_campaign_name(),
            warn_small_catch_all: true,
        }
    }
}

fn default_min_group() -> usize {
    3
}
fn default_max_group() -> usize {
    50
}
fn default_optimal_group() -> usize {
    15
}
fn default_match_types() -> Vec<MatchType> {
    vec![MatchType::Broad]
}
fn default_campaign_name() -> String {
    "Campaign".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kwplanner/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| KwPlannerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kwplanner/kwplanner.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| KwPlannerError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KwPlannerError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| KwPlannerError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KwPlannerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KwPlannerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KwPlannerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let groups = &config.ad_groups;
    if groups.min_keywords == 0 || groups.optimal_keywords == 0 {
        return Err(KwPlannerError::config(
            "ad_groups.min_keywords and ad_groups.optimal_keywords must be at least 1",
        ));
    }
    if groups.min_keywords > groups.max_keywords || groups.optimal_keywords > groups.max_keywords {
        return Err(KwPlannerError::config(format!(
            "ad_groups bounds are inconsistent: min {} / optimal {} / max {}",
            groups.min_keywords, groups.optimal_keywords, groups.max_keywords
        )));
    }
    if config.gateway.max_concurrent == 0 {
        return Err(KwPlannerError::config("gateway.max_concurrent must be at least 1"));
    }
    if config.gateway.timeout_secs == 0 {
        return Err(KwPlannerError::config("gateway.timeout_secs must be at least 1"));
    }
    if config.gateway.max_attempts == 0 {
        return Err(KwPlannerError::config("gateway.max_attempts must be at least 1"));
    }
    if !(1..=MAX_TERMS_PER_REQUEST).contains(&config.defaults.batch_size) {
        return Err(KwPlannerError::config(format!(
            "defaults.batch_size must be within 1..={MAX_TERMS_PER_REQUEST}"
        )));
    }
    if !(0.0..=1.0).contains(&config.filters.max_competition) {
        return Err(KwPlannerError::config("filters.max_competition must be within 0..1"));
    }
    Ok(())
}

/// Check that the env vars the selected auth mode reads are set and non-empty.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    let gateway = &config.gateway;
    let required: Vec<&str> = match gateway.auth {
        AuthMode::Basic => vec![&gateway.login_env, &gateway.password_env],
        AuthMode::Bearer | AuthMode::ApiKey => vec![&gateway.token_env],
        AuthMode::None => Vec::new(),
    };

    for var_name in required {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(KwPlannerError::config(format!(
                    "credentials not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("location_code"));
        assert!(toml_str.contains("KWPLANNER_LOGIN"));
        assert!(toml_str.contains("keywords/{platform}/suggestions"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.location_code, 2840);
        assert_eq!(parsed.gateway.max_concurrent, 5);
        assert_eq!(parsed.cache.ttl_hours, 24);
        assert_eq!(parsed.ad_groups.match_types, vec![MatchType::Broad]);
        assert_eq!(parsed.locations, LocationPatterns::default());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[defaults]
platform = "bing_ads"

[gateway]
auth = "bearer"

[ad_groups]
match_types = ["exact", "broad_modifier"]

[[categories]]
name = "drains"
patterns = ["drain", "clog"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.platform, Platform::BingAds);
        assert_eq!(config.defaults.batch_size, 100);
        assert_eq!(config.gateway.auth, AuthMode::Bearer);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(
            config.ad_groups.match_types,
            vec![MatchType::Exact, MatchType::BroadModifier]
        );
        assert_eq!(config.ad_groups.optimal_keywords, 15);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].patterns, vec!["drain", "clog"]);
        assert_eq!(config.filters.min_search_volume, 10);
    }

    #[test]
    fn endpoint_paths_use_platform_slug() {
        let endpoints = EndpointsConfig::default();
        assert_eq!(
            endpoints.suggestions_path(Platform::BingAds),
            "keywords/bing/suggestions"
        );
        assert_eq!(
            endpoints.metrics_path(Platform::GoogleAds),
            "keywords/google_ads/metrics"
        );
    }

    #[test]
    fn invalid_group_bounds_rejected() {
        let mut config = AppConfig::default();
        config.ad_groups.min_keywords = 60;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("inconsistent"));

        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn batch_size_is_bounded_by_request_limit() {
        let mut config = AppConfig::default();
        config.defaults.batch_size = MAX_TERMS_PER_REQUEST;
        assert!(validate_config(&config).is_ok());

        config.defaults.batch_size = MAX_TERMS_PER_REQUEST + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("defaults.batch_size"));

        config.defaults.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.gateway.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("gateway.timeout_secs"));
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("kw-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kwplanner.toml");
        std::fs::write(&path, "[cache]\nttl_hours = 6\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.cache.ttl_hours, 6);
        assert!(config.cache.enabled);

        std::fs::write(&path, "[cache\nbroken").unwrap();
        assert!(matches!(load_config_from(&path), Err(KwPlannerError::Config { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/cache/kw").unwrap(), PathBuf::from("/var/cache/kw"));
        let resolved = expand_home("~/.kwplanner/cache").unwrap();
        assert!(resolved.ends_with(".kwplanner/cache"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn credential_validation() {
        let mut config = AppConfig::default();
        // Unique env var names avoid interfering with other tests
        config.gateway.auth = AuthMode::Bearer;
        config.gateway.token_env = "KW_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = validate_credentials(&config);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("KW_TEST_NONEXISTENT_TOKEN_12345")
        );

        config.gateway.auth = AuthMode::None;
        assert!(validate_credentials(&config).is_ok());
    }
}
