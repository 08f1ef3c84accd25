//! Seed expansion through the suggestion source.
//!
//! Each seed is looked up in the cache first and fetched only on a miss. Fetches run
//! concurrently (bounded by the gateway's permits); results are then merged one seed
//! at a time, in seed order, through a single seen-set so a term is emitted at most
//! once per call. A seed whose fetch fails contributes no suggestions but still gets
//! its own row when seeds are included.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use kwplanner_cache::{CacheKey, ExpansionCache};
use kwplanner_gateway::{KeywordDataSource, SuggestionRequest};
use kwplanner_shared::{
    AppConfig, DEFAULT_CATEGORY, ExpandedKeyword, KeywordSuggestion, Platform, RequestError,
    Result, SeedKeyword, round2, validate_term,
};

/// Targeting for one expansion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandOptions {
    pub platform: Platform,
    pub location_code: u32,
    pub language_code: String,
    /// Emit each seed term itself (with zeroed metrics) if no suggestion produced it.
    pub include_seed: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            platform: Platform::GoogleAds,
            location_code: 2840,
            language_code: "en".into(),
            include_seed: true,
        }
    }
}

impl From<&AppConfig> for ExpandOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            platform: config.defaults.platform,
            location_code: config.defaults.location_code,
            language_code: config.defaults.language_code.clone(),
            include_seed: config.defaults.include_seed,
        }
    }
}

/// Expanded keywords plus per-call counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionOutcome {
    pub keywords: Vec<ExpandedKeyword>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failed_seeds: usize,
}

struct SeedFetch {
    suggestions: Vec<KeywordSuggestion>,
    cache_hit: bool,
    failed: bool,
}

/// Expands seeds into related keywords.
#[derive(Clone)]
pub struct KeywordExpander {
    source: Arc<dyn KeywordDataSource>,
    cache: Arc<ExpansionCache>,
}

impl KeywordExpander {
    pub fn new(source: Arc<dyn KeywordDataSource>, cache: Arc<ExpansionCache>) -> Self {
        Self { source, cache }
    }

    /// Expand every seed.
    ///
    /// Fails only for invalid input (an empty seed term). Request failures are logged
    /// and counted in [`ExpansionOutcome::failed_seeds`].
    #[instrument(skip_all, fields(seeds = seeds.len(), platform = %options.platform))]
    pub async fn expand(&self, seeds: &[SeedKeyword], options: &ExpandOptions) -> Result<ExpansionOutcome> {
        let mut prepared = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let term = seed.normalized_term()?;
            let request = SuggestionRequest::new(
                options.platform,
                vec![term.clone()],
                options.location_code,
                options.language_code.clone(),
            )?;
            prepared.push((seed, term, request));
        }

        let fetches = join_all(
            prepared
                .iter()
                .map(|(_, term, request)| self.fetch(term, request)),
        )
        .await;

        let mut outcome = ExpansionOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for ((seed, term, _), fetch) in prepared.iter().zip(fetches) {
            if fetch.cache_hit {
                outcome.cache_hits += 1;
            } else {
                outcome.cache_misses += 1;
            }
            if fetch.failed {
                outcome.failed_seeds += 1;
            }

            let category = seed_category(seed);
            for suggestion in fetch.suggestions {
                let keyword = match validate_term(&suggestion.keyword) {
                    Ok(keyword) => keyword,
                    Err(e) => {
                        debug!(seed = %term, error = %e, "skipping suggestion");
                        continue;
                    }
                };
                if !seen.insert(keyword.clone()) {
                    continue;
                }
                outcome.keywords.push(expanded(keyword, term, &category, &suggestion, options));
            }

            if options.include_seed && seen.insert(term.clone()) {
                outcome.keywords.push(expanded(
                    term.clone(),
                    term,
                    &category,
                    &KeywordSuggestion::default(),
                    options,
                ));
            }
        }

        info!(
            keywords = outcome.keywords.len(),
            cache_hits = outcome.cache_hits,
            cache_misses = outcome.cache_misses,
            failed_seeds = outcome.failed_seeds,
            "expanded seed keywords"
        );
        Ok(outcome)
    }

    async fn fetch(&self, term: &str, request: &SuggestionRequest) -> SeedFetch {
        let key = CacheKey::expansion(term, request.platform, request.location_code);

        match self.cache.get_as::<Vec<KeywordSuggestion>>(&key).await {
            Ok(Some(suggestions)) => {
                debug!(seed = term, count = suggestions.len(), "suggestions from cache");
                return SeedFetch {
                    suggestions,
                    cache_hit: true,
                    failed: false,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(seed = term, error = %e, "cache read failed, fetching"),
        }

        match self.source.suggest(request).await {
            Ok(suggestions) => {
                if let Err(e) = self.cache.put_as(&key, &suggestions).await {
                    warn!(seed = term, error = %e, "failed to cache suggestions");
                }
                SeedFetch {
                    suggestions,
                    cache_hit: false,
                    failed: false,
                }
            }
            Err(e) => {
                log_request_failure(term, &e);
                SeedFetch {
                    suggestions: Vec::new(),
                    cache_hit: false,
                    failed: true,
                }
            }
        }
    }
}

fn log_request_failure(seed: &str, err: &RequestError) {
    if err.is_permanent() {
        error!(seed, error = %err, "suggestion request rejected, skipping seed");
    } else {
        warn!(seed, error = %err, "suggestion request failed, skipping seed");
    }
}

fn seed_category(seed: &SeedKeyword) -> String {
    let category = seed.category.trim();
    if category.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category.to_string()
    }
}

fn expanded(
    keyword: String,
    seed: &str,
    category: &str,
    suggestion: &KeywordSuggestion,
    options: &ExpandOptions,
) -> ExpandedKeyword {
    ExpandedKeyword {
        keyword,
        seed_keyword: seed.to_string(),
        category: category.to_string(),
        platform: options.platform,
        location_code: options.location_code,
        language_code: options.language_code.clone(),
        search_volume: suggestion.search_volume.unwrap_or(0),
        competition: suggestion.competition.unwrap_or(0.0).clamp(0.0, 1.0),
        cpc: round2(suggestion.cpc.unwrap_or(0.0).max(0.0)),
        location_type: None,
        location_value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubSource, suggestion};
    use kwplanner_cache::DEFAULT_TTL;
    use kwplanner_gateway::{GatewayOptions, HttpKeywordSource, RequestGateway, RetryPolicy};
    use kwplanner_shared::{EndpointsConfig, KwPlannerError};
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed(term: &str, category: &str) -> SeedKeyword {
        SeedKeyword::new(term, category).unwrap()
    }

    fn expander(source: StubSource) -> (KeywordExpander, Arc<StubSource>) {
        let source = Arc::new(source);
        let expander = KeywordExpander::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        (expander, source)
    }

    fn http_source(server: &MockServer) -> Arc<HttpKeywordSource> {
        let options = GatewayOptions {
            base_url: Url::parse(&server.uri()).unwrap(),
            max_concurrent: 5,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(2),
        };
        Arc::new(HttpKeywordSource::new(
            RequestGateway::unauthenticated(options).unwrap(),
            EndpointsConfig::default(),
        ))
    }

    #[tokio::test]
    async fn suggestions_and_seed_share_the_seed_category() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/keywords/google_ads/suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 20000,
                "tasks": [{"status_code": 20000, "result": [
                    {"keyword": "plumber near me", "search_volume": 1000},
                    {"keyword": "local plumber", "search_volume": 800}
                ]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let expander = KeywordExpander::new(http_source(&server), Arc::new(ExpansionCache::disabled()));
        let outcome = expander
            .expand(&[seed("plumber", "service")], &ExpandOptions::default())
            .await
            .unwrap();

        let terms: Vec<&str> = outcome.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(terms, vec!["plumber near me", "local plumber", "plumber"]);
        assert!(outcome.keywords.iter().all(|k| k.category == "service"));
        assert!(outcome.keywords.iter().all(|k| k.seed_keyword == "plumber"));
        assert_eq!(outcome.keywords[0].search_volume, 1000);
        assert_eq!(outcome.keywords[2].search_volume, 0);
    }

    #[tokio::test]
    async fn terms_are_deduplicated_across_seeds() {
        let source = StubSource::default()
            .with_suggestions(
                "plumber",
                vec![
                    suggestion("emergency plumber", 500, Some(9.0), Some(0.8)),
                    suggestion("Drain Cleaning", 300, None, None),
                ],
            )
            .with_suggestions(
                "drain cleaning",
                vec![
                    suggestion("drain cleaning", 300, None, None),
                    suggestion("EMERGENCY  plumber", 500, None, None),
                    suggestion("plumber", 2000, None, None),
                ],
            );
        let (expander, _) = expander(source);
        let outcome = expander
            .expand(
                &[seed("plumber", "service"), seed("drain cleaning", "drains")],
                &ExpandOptions::default(),
            )
            .await
            .unwrap();

        let mut terms: Vec<String> = outcome.keywords.iter().map(|k| k.keyword.to_lowercase()).collect();
        let total = terms.len();
        terms.sort();
        terms.dedup();
        assert_eq!(terms.len(), total);
        assert_eq!(total, 3);

        // The first seed to see a term owns it.
        let drain = outcome
            .keywords
            .iter()
            .find(|k| k.keyword == "drain cleaning")
            .unwrap();
        assert_eq!(drain.seed_keyword, "plumber");
        assert_eq!(drain.category, "service");
    }

    #[tokio::test]
    async fn failed_seed_still_emits_its_own_row() {
        let source = StubSource::default()
            .with_suggestions("plumber", vec![suggestion("local plumber", 800, Some(4.0), Some(0.3))])
            .failing_on("roofer");
        let (expander, source) = expander(source);
        let outcome = expander
            .expand(
                &[seed("roofer", "roofing"), seed("plumber", "service")],
                &ExpandOptions::default(),
            )
            .await
            .unwrap();

        let terms: Vec<&str> = outcome.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(terms, vec!["roofer", "local plumber", "plumber"]);
        assert_eq!(outcome.failed_seeds, 1);
        assert_eq!(source.suggest_calls(), 2);
    }

    #[tokio::test]
    async fn seed_rows_can_be_excluded() {
        let source = StubSource::default()
            .with_suggestions("plumber", vec![suggestion("local plumber", 800, None, None)]);
        let (expander, _) = expander(source);
        let options = ExpandOptions {
            include_seed: false,
            ..ExpandOptions::default()
        };
        let outcome = expander.expand(&[seed("plumber", "service")], &options).await.unwrap();
        assert_eq!(outcome.keywords.len(), 1);
    }

    #[tokio::test]
    async fn overlong_and_blank_suggestions_are_skipped() {
        let long = "plumber ".repeat(70);
        let source = StubSource::default().with_suggestions(
            "plumber",
            vec![
                suggestion(&long, 900, None, None),
                suggestion("   ", 100, None, None),
                suggestion("local plumber", 800, None, None),
            ],
        );
        let (expander, _) = expander(source);
        let outcome = expander
            .expand(&[seed("plumber", "service")], &ExpandOptions::default())
            .await
            .unwrap();

        let terms: Vec<&str> = outcome.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(terms, vec!["local plumber", "plumber"]);
    }

    #[tokio::test]
    async fn empty_seed_is_rejected() {
        let (expander, source) = expander(StubSource::default());
        let bad = SeedKeyword {
            term: "   ".into(),
            category: "service".into(),
        };
        let err = expander
            .expand(&[seed("plumber", "service"), bad], &ExpandOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KwPlannerError::Validation { .. }));
        assert_eq!(source.suggest_calls(), 0);
    }

    #[tokio::test]
    async fn suggestion_metrics_are_clamped_and_rounded() {
        let source = StubSource::default().with_suggestions(
            "plumber",
            vec![suggestion("plumber cost", 40, Some(3.456), Some(1.7))],
        );
        let (expander, _) = expander(source);
        let outcome = expander
            .expand(&[seed("plumber", "")], &ExpandOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.keywords[0].cpc, 3.46);
        assert_eq!(outcome.keywords[0].competition, 1.0);
        assert_eq!(outcome.keywords[0].category, "general");
    }

    #[tokio::test]
    async fn warm_cache_is_idempotent_and_offline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/keywords/google_ads/suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{"result": [
                    {"keyword": "plumber near me", "search_volume": 1000, "cpc": 5.5, "competition": 0.7},
                    {"keyword": "local plumber", "search_volume": 800}
                ]}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("kw-expander-test-{}", Uuid::now_v7()));
        let cache = Arc::new(ExpansionCache::open(&dir, DEFAULT_TTL).await.unwrap());
        let expander = KeywordExpander::new(http_source(&server), cache);
        let seeds = [seed("plumber", "service"), seed("drain cleaning", "drains")];
        let options = ExpandOptions::default();

        let first = expander.expand(&seeds, &options).await.unwrap();
        assert_eq!(first.cache_misses, 2);

        let second = expander.expand(&seeds, &options).await.unwrap();
        assert_eq!(second.cache_hits, 2);
        assert_eq!(second.cache_misses, 0);
        assert_eq!(
            serde_json::to_vec(&first.keywords).unwrap(),
            serde_json::to_vec(&second.keywords).unwrap()
        );

        // Mock::expect(2) verifies no further calls when the server drops.
        drop(server);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let dir = std::env::temp_dir().join(format!("kw-expander-test-{}", Uuid::now_v7()));
        let cache = Arc::new(ExpansionCache::open(&dir, DEFAULT_TTL).await.unwrap());
        let source = Arc::new(StubSource::default().failing_on("plumber").permanent_failures());
        let expander = KeywordExpander::new(source.clone(), cache);

        let seeds = [seed("plumber", "service")];
        expander.expand(&seeds, &ExpandOptions::default()).await.unwrap();
        let second = expander.expand(&seeds, &ExpandOptions::default()).await.unwrap();

        assert_eq!(second.cache_hits, 0);
        assert_eq!(second.failed_seeds, 1);
        assert_eq!(source.suggest_calls(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
