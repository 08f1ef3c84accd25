//! Batched metrics enrichment.
//!
//! Keywords are cut into consecutive batches. Within a batch every term is checked
//! against the cache on its own; only the terms without a fresh entry are sent to
//! the metrics source, and each returned term is cached individually. A batch whose
//! request fails is left exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use kwplanner_cache::{CacheKey, ExpansionCache};
use kwplanner_gateway::{KeywordDataSource, MAX_TERMS_PER_REQUEST, MetricsRequest};
use kwplanner_shared::{
    AppConfig, ExpandedKeyword, KeywordSuggestion, Platform, normalize_term, round2,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    pub platform: Platform,
    pub batch_size: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            platform: Platform::GoogleAds,
            batch_size: 100,
        }
    }
}

impl From<&AppConfig> for EnrichOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            platform: config.defaults.platform,
            batch_size: config.defaults.batch_size,
        }
    }
}

/// Counters from one enrichment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentReport {
    pub batches: usize,
    pub failed_batches: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Keywords that received metrics.
    pub enriched: usize,
}

#[derive(Default)]
struct BatchFetch {
    metrics: HashMap<String, KeywordSuggestion>,
    cache_hits: usize,
    cache_misses: usize,
    failed: bool,
}

/// Fills in search volume, cpc and competition.
#[derive(Clone)]
pub struct MetricsEnricher {
    source: Arc<dyn KeywordDataSource>,
    cache: Arc<ExpansionCache>,
}

impl MetricsEnricher {
    pub fn new(source: Arc<dyn KeywordDataSource>, cache: Arc<ExpansionCache>) -> Self {
        Self { source, cache }
    }

    /// Enrich `keywords` in place. Never fails; failed batches are counted.
    #[instrument(skip_all, fields(keywords = keywords.len(), batch_size = options.batch_size))]
    pub async fn enrich(&self, keywords: &mut [ExpandedKeyword], options: &EnrichOptions) -> EnrichmentReport {
        let batch_size = options.batch_size.clamp(1, MAX_TERMS_PER_REQUEST);
        let fetches = join_all(
            keywords
                .chunks(batch_size)
                .enumerate()
                .map(|(index, batch)| self.fetch_batch(index, batch, options.platform)),
        )
        .await;

        let mut report = EnrichmentReport {
            batches: fetches.len(),
            ..EnrichmentReport::default()
        };
        for (batch, fetch) in keywords.chunks_mut(batch_size).zip(fetches) {
            report.cache_hits += fetch.cache_hits;
            report.cache_misses += fetch.cache_misses;
            if fetch.failed {
                report.failed_batches += 1;
                continue;
            }
            for keyword in batch.iter_mut() {
                if let Some(metrics) = fetch.metrics.get(&normalize_term(&keyword.keyword)) {
                    apply(keyword, metrics);
                    report.enriched += 1;
                }
            }
        }

        info!(
            batches = report.batches,
            failed_batches = report.failed_batches,
            enriched = report.enriched,
            cache_hits = report.cache_hits,
            cache_misses = report.cache_misses,
            "enriched keyword metrics"
        );
        report
    }

    async fn fetch_batch(&self, index: usize, batch: &[ExpandedKeyword], platform: Platform) -> BatchFetch {
        let mut fetch = BatchFetch::default();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for keyword in batch {
            let term = normalize_term(&keyword.keyword);
            if term.is_empty() || !seen.insert(term.clone()) {
                continue;
            }
            match self
                .cache
                .get_as::<KeywordSuggestion>(&CacheKey::metrics(&term, platform))
                .await
            {
                Ok(Some(metrics)) => {
                    fetch.cache_hits += 1;
                    fetch.metrics.insert(term, metrics);
                }
                Ok(None) => {
                    fetch.cache_misses += 1;
                    missing.push(term);
                }
                Err(e) => {
                    warn!(term = %term, error = %e, "cache read failed, fetching");
                    fetch.cache_misses += 1;
                    missing.push(term);
                }
            }
        }

        let Some(first) = batch.first() else {
            return fetch;
        };
        if missing.is_empty() {
            debug!(batch = index, "batch fully cached");
            return fetch;
        }

        let requested = missing.len();
        let request = match MetricsRequest::new(
            platform,
            missing,
            first.location_code,
            first.language_code.clone(),
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!(batch = index, error = %e, "invalid metrics request, skipping batch");
                return BatchFetch {
                    failed: true,
                    ..fetch
                };
            }
        };

        match self.source.metrics(&request).await {
            Ok(items) => {
                debug!(batch = index, requested, returned = items.len(), "fetched metrics");
                for mut item in items {
                    let term = normalize_term(&item.keyword);
                    if term.is_empty() {
                        continue;
                    }
                    item.keyword = term.clone();
                    if let Err(e) = self
                        .cache
                        .put_as(&CacheKey::metrics(&term, platform), &item)
                        .await
                    {
                        warn!(term = %term, error = %e, "failed to cache metrics");
                    }
                    fetch.metrics.insert(term, item);
                }
                fetch
            }
            Err(e) => {
                if e.is_permanent() {
                    error!(batch = index, error = %e, "metrics request rejected, batch left unchanged");
                } else {
                    warn!(batch = index, error = %e, "metrics request failed, batch left unchanged");
                }
                BatchFetch {
                    metrics: HashMap::new(),
                    failed: true,
                    ..fetch
                }
            }
        }
    }
}

fn apply(keyword: &mut ExpandedKeyword, metrics: &KeywordSuggestion) {
    keyword.search_volume = metrics.search_volume.unwrap_or(0);
    keyword.competition = metrics.competition.unwrap_or(0.0).clamp(0.0, 1.0);
    keyword.cpc = round2(metrics.cpc.unwrap_or(0.0).max(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubSource, suggestion};
    use kwplanner_cache::DEFAULT_TTL;
    use uuid::Uuid;

    fn ek(term: &str) -> ExpandedKeyword {
        ExpandedKeyword {
            keyword: term.into(),
            seed_keyword: "plumber".into(),
            category: "service".into(),
            platform: Platform::GoogleAds,
            location_code: 2840,
            language_code: "en".into(),
            search_volume: 0,
            competition: 0.25,
            cpc: 1.5,
            location_type: None,
            location_value: None,
        }
    }

    fn stub() -> StubSource {
        StubSource::default()
            .with_metrics(suggestion("plumber", 2000, Some(6.789), Some(0.8)))
            .with_metrics(suggestion("local plumber", 800, Some(4.0), None))
            .with_metrics(suggestion("plumber near me", 1000, None, Some(0.4)))
    }

    fn options(batch_size: usize) -> EnrichOptions {
        EnrichOptions {
            platform: Platform::GoogleAds,
            batch_size,
        }
    }

    #[tokio::test]
    async fn metrics_are_applied_by_term() {
        let source = Arc::new(stub());
        let enricher = MetricsEnricher::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        let mut keywords = vec![ek("plumber"), ek("local plumber"), ek("unknown term")];

        let report = enricher.enrich(&mut keywords, &options(100)).await;

        assert_eq!(report.enriched, 2);
        assert_eq!(keywords[0].search_volume, 2000);
        assert_eq!(keywords[0].cpc, 6.79);
        assert_eq!(keywords[0].competition, 0.8);
        assert_eq!(keywords[1].competition, 0.0);
        // Terms the source does not know keep their values.
        assert_eq!(keywords[2].cpc, 1.5);
        assert_eq!(source.metrics_requests().len(), 1);
    }

    #[tokio::test]
    async fn keywords_are_sent_in_batches() {
        let source = Arc::new(stub());
        let enricher = MetricsEnricher::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        let mut keywords: Vec<ExpandedKeyword> = ["a", "b", "c", "d", "e"].iter().map(|t| ek(t)).collect();

        let report = enricher.enrich(&mut keywords, &options(2)).await;

        assert_eq!(report.batches, 3);
        let mut sizes: Vec<usize> = source.metrics_requests().iter().map(Vec::len).collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn failed_batch_is_left_unmodified() {
        let source = Arc::new(stub().failing_on("broken term"));
        let enricher = MetricsEnricher::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        let mut keywords = vec![
            ek("plumber"),
            ek("broken term"),
            ek("local plumber"),
            ek("plumber near me"),
        ];
        let before = keywords[..2].to_vec();

        let report = enricher.enrich(&mut keywords, &options(2)).await;

        assert_eq!(report.failed_batches, 1);
        assert_eq!(&keywords[..2], before.as_slice());
        assert_eq!(keywords[2].search_volume, 800);
        assert_eq!(keywords[3].search_volume, 1000);
    }

    #[tokio::test]
    async fn cached_terms_are_not_requested_again() {
        let dir = std::env::temp_dir().join(format!("kw-enricher-test-{}", Uuid::now_v7()));
        let cache = Arc::new(ExpansionCache::open(&dir, DEFAULT_TTL).await.unwrap());
        cache
            .put_as(
                &CacheKey::metrics("plumber", Platform::GoogleAds),
                &suggestion("plumber", 1234, Some(2.0), Some(0.5)),
            )
            .await
            .unwrap();

        let source = Arc::new(stub());
        let enricher = MetricsEnricher::new(source.clone(), cache);
        let mut keywords = vec![ek("plumber"), ek("local plumber")];
        let report = enricher.enrich(&mut keywords, &options(100)).await;

        assert_eq!(report.cache_hits, 1);
        assert_eq!(source.metrics_requests(), vec![vec!["local plumber".to_string()]]);
        assert_eq!(keywords[0].search_volume, 1234);

        // Everything is cached now.
        let mut again = vec![ek("plumber"), ek("local plumber")];
        let report = enricher.enrich(&mut again, &options(100)).await;
        assert_eq!(report.cache_hits, 2);
        assert_eq!(source.metrics_requests().len(), 1);
        assert_eq!(again, keywords);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn batch_size_is_capped_at_the_request_limit() {
        let source = Arc::new(stub());
        let enricher = MetricsEnricher::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        let mut keywords: Vec<ExpandedKeyword> =
            (0..1001).map(|i| ek(&format!("plumber {i}"))).collect();
        keywords[1000] = ek("plumber");

        let report = enricher.enrich(&mut keywords, &options(2000)).await;

        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.enriched, 1);
        assert_eq!(keywords[1000].search_volume, 2000);
        let mut sizes: Vec<usize> = source.metrics_requests().iter().map(Vec::len).collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, MAX_TERMS_PER_REQUEST]);
    }

    #[tokio::test]
    async fn empty_input_makes_no_requests() {
        let source = Arc::new(stub());
        let enricher = MetricsEnricher::new(source.clone(), Arc::new(ExpansionCache::disabled()));
        let report = enricher.enrich(&mut [], &options(100)).await;
        assert_eq!(report, EnrichmentReport::default());
        assert!(source.metrics_requests().is_empty());
    }
}
