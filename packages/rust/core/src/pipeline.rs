//! End-to-end planning pipeline: seeds → expand → combine → enrich → filter →
//! categorize → ad groups.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use kwplanner_cache::ExpansionCache;
use kwplanner_gateway::{HttpKeywordSource, KeywordDataSource};
use kwplanner_shared::{
    AdGroup, AppConfig, CategoryRule, ExpandedKeyword, Keyword, Location, LocationPatterns, Result,
    SeedKeyword,
};

use crate::balancer::{self, BalanceOptions};
use crate::categorizer;
use crate::enricher::{EnrichOptions, EnrichmentReport, MetricsEnricher};
use crate::expander::{ExpandOptions, ExpansionOutcome, KeywordExpander};
use crate::filter::{self, FilterCriteria};
use crate::locations;
use crate::stats::{AdGroupStatistics, ad_group_statistics};

/// Settings for a full pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub expand: ExpandOptions,
    pub enrich: EnrichOptions,
    pub filter: FilterCriteria,
    pub balance: BalanceOptions,
    pub location_patterns: LocationPatterns,
    /// Empty means the built-in rules.
    pub category_rules: Vec<CategoryRule>,
    pub auto_categorize: bool,
    /// Keywords kept after filtering, highest volume first.
    pub max_keywords: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            expand: ExpandOptions::from(config),
            enrich: EnrichOptions::from(config),
            filter: FilterCriteria::from(config),
            balance: BalanceOptions::from(config),
            location_patterns: config.locations.clone(),
            category_rules: config.categories.clone(),
            auto_categorize: true,
            max_keywords: config.defaults.max_keywords,
        }
    }
}

/// Keyword counts after each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageCounts {
    pub expanded: usize,
    /// Location variants; zero when no locations were given.
    pub combined: usize,
    pub enriched: usize,
    pub filtered: usize,
    pub kept: usize,
    pub failed_seeds: usize,
    pub failed_batches: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub keywords: Vec<ExpandedKeyword>,
    pub ad_groups: Vec<AdGroup>,
    pub statistics: AdGroupStatistics,
    pub stages: StageCounts,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, name: &str);
    /// Called when a stage finishes with `count` keywords (or groups).
    fn stage_done(&self, name: &str, count: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _name: &str) {}
    fn stage_done(&self, _name: &str, _count: usize) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// The keyword planner. Holds the data source and cache shared by every stage.
#[derive(Clone)]
pub struct KeywordPipeline {
    expander: KeywordExpander,
    enricher: MetricsEnricher,
    config: PipelineConfig,
}

impl KeywordPipeline {
    pub fn new(
        source: Arc<dyn KeywordDataSource>,
        cache: Arc<ExpansionCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            expander: KeywordExpander::new(source.clone(), cache.clone()),
            enricher: MetricsEnricher::new(source, cache),
            config,
        }
    }

    /// Build the HTTP source and cache described by the config file.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let source = HttpKeywordSource::from_config(config)?;
        let cache = ExpansionCache::from_config(&config.cache).await?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(cache),
            PipelineConfig::from(config),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub async fn expand_seed_keywords(
        &self,
        seeds: &[SeedKeyword],
        options: &ExpandOptions,
    ) -> Result<ExpansionOutcome> {
        self.expander.expand(seeds, options).await
    }

    /// Location variants of `keywords` using the configured patterns.
    pub fn combine_with_locations(
        &self,
        keywords: &[ExpandedKeyword],
        locations: &[Location],
    ) -> Vec<ExpandedKeyword> {
        locations::combine_with_locations(keywords, locations, &self.config.location_patterns)
    }

    pub async fn enrich_keywords_with_metrics(
        &self,
        keywords: &mut [ExpandedKeyword],
        options: &EnrichOptions,
    ) -> EnrichmentReport {
        self.enricher.enrich(keywords, options).await
    }

    pub fn filter_keywords(
        &self,
        keywords: Vec<ExpandedKeyword>,
        criteria: &FilterCriteria,
    ) -> Vec<ExpandedKeyword> {
        filter::filter_keywords(keywords, criteria)
    }

    pub fn categorize_keywords(&self, keywords: &mut [ExpandedKeyword]) {
        categorizer::categorize_keywords(
            keywords,
            &self.config.category_rules,
            self.config.auto_categorize,
        );
    }

    pub fn create_ad_groups(&self, keywords: &[Keyword], options: &BalanceOptions) -> Result<Vec<AdGroup>> {
        balancer::create_ad_groups(keywords, options)
    }

    // -----------------------------------------------------------------------
    // Full run
    // -----------------------------------------------------------------------

    /// Run every stage with the pipeline's configuration.
    ///
    /// Fails only for invalid input (seeds, locations, group bounds); request
    /// failures shrink the result instead.
    #[instrument(skip_all, fields(seeds = seeds.len(), locations = locations.len()))]
    pub async fn run(
        &self,
        seeds: &[SeedKeyword],
        locations: &[Location],
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::now_v7();
        let config = &self.config;
        config.balance.validate()?;
        let locations = locations
            .iter()
            .map(Location::normalized)
            .collect::<Result<Vec<_>>>()?;

        let mut stages = StageCounts::default();

        progress.stage("expand");
        let expansion = self.expand_seed_keywords(seeds, &config.expand).await?;
        stages.expanded = expansion.keywords.len();
        stages.failed_seeds = expansion.failed_seeds;
        let mut cache_hits = expansion.cache_hits;
        let mut cache_misses = expansion.cache_misses;
        let mut keywords = expansion.keywords;
        progress.stage_done("expand", stages.expanded);

        if !locations.is_empty() {
            progress.stage("combine");
            keywords = self.combine_with_locations(&keywords, &locations);
            stages.combined = keywords.len();
            progress.stage_done("combine", stages.combined);
        }

        progress.stage("enrich");
        let report = self
            .enrich_keywords_with_metrics(&mut keywords, &config.enrich)
            .await;
        stages.enriched = report.enriched;
        stages.failed_batches = report.failed_batches;
        cache_hits += report.cache_hits;
        cache_misses += report.cache_misses;
        progress.stage_done("enrich", report.enriched);

        progress.stage("filter");
        let mut keywords = self.filter_keywords(keywords, &config.filter);
        stages.filtered = keywords.len();
        if keywords.len() > config.max_keywords {
            keywords.sort_by(|a, b| b.search_volume.cmp(&a.search_volume));
            keywords.truncate(config.max_keywords);
        }
        stages.kept = keywords.len();
        progress.stage_done("filter", stages.kept);

        progress.stage("categorize");
        self.categorize_keywords(&mut keywords);
        progress.stage_done("categorize", keywords.len());

        progress.stage("ad groups");
        let balancer_input: Vec<Keyword> = keywords.iter().map(ExpandedKeyword::to_keyword).collect();
        let ad_groups = self.create_ad_groups(&balancer_input, &config.balance)?;
        let statistics = ad_group_statistics(&ad_groups, &config.balance);
        progress.stage_done("ad groups", ad_groups.len());

        let result = PipelineResult {
            run_id,
            started_at,
            keywords,
            ad_groups,
            statistics,
            stages,
            cache_hits,
            cache_misses,
            elapsed: start.elapsed(),
        };

        info!(
            run_id = %result.run_id,
            keywords = result.keywords.len(),
            ad_groups = result.ad_groups.len(),
            failed_seeds = stages.failed_seeds,
            failed_batches = stages.failed_batches,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "pipeline complete"
        );
        progress.done(&result);
        Ok(result)
    }
}
