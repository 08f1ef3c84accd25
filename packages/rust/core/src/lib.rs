//! Keyword planning logic for kwplanner.
//!
//! This crate ties the keyword data source and cache together into the planning
//! stages (expansion, location combination, metrics enrichment, filtering,
//! categorization, ad-group balancing) and the end-to-end [`KeywordPipeline`].

pub mod balancer;
pub mod bids;
pub mod categorizer;
pub mod enricher;
pub mod expander;
pub mod filter;
pub mod locations;
pub mod pipeline;
pub mod stats;

#[cfg(test)]
mod testing;

pub use balancer::{BalanceOptions, CATCH_ALL_GROUP, create_ad_groups, group_key};
pub use categorizer::{categorize_keywords, default_category_rules};
pub use enricher::{EnrichOptions, EnrichmentReport, MetricsEnricher};
pub use expander::{ExpandOptions, ExpansionOutcome, KeywordExpander};
pub use filter::{FilterCriteria, filter_keywords};
pub use locations::combine_with_locations;
pub use pipeline::{
    KeywordPipeline, PipelineConfig, PipelineResult, ProgressReporter, SilentProgress, StageCounts,
};
pub use stats::{AdGroupStatistics, ValidationIssue, ad_group_statistics, validate_ad_groups};
