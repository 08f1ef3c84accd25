//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use kwplanner_core::{
    KeywordPipeline, PipelineResult, ProgressReporter, validate_ad_groups,
};
use kwplanner_shared::{
    AppConfig, DEFAULT_CATEGORY, Location, MatchType, Platform, SeedKeyword, init_config,
    load_config, validate_credentials,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kwplanner: keyword research and ad-group planning.
#[derive(Parser)]
#[command(
    name = "kwplanner",
    version,
    about = "Expand seed keywords, enrich them with metrics, and plan balanced ad groups.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a set of seed keywords.
    Plan {
        /// JSON file with an array of seeds: strings or {"term", "category"} objects.
        #[arg(long)]
        seeds: PathBuf,

        /// JSON file with an array of {"city", "state", "zip_code"} objects.
        #[arg(long)]
        locations: Option<PathBuf>,

        /// Target platform: google_ads or bing_ads (overrides the config file).
        #[arg(long)]
        platform: Option<String>,

        /// Match types, comma-separated (overrides the config file).
        #[arg(long, value_delimiter = ',')]
        match_types: Vec<String>,

        /// Print the full result as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kwplanner=info",
        1 => "kwplanner=debug",
        _ => "kwplanner=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Plan {
            seeds,
            locations,
            platform,
            match_types,
            json,
        } => {
            cmd_plan(
                &seeds,
                locations.as_deref(),
                platform.as_deref(),
                &match_types,
                json,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Input files
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedInput {
    Term(String),
    Seed(SeedKeyword),
}

fn parse_seeds(json: &str) -> Result<Vec<SeedKeyword>> {
    let inputs: Vec<SeedInput> =
        serde_json::from_str(json).wrap_err("seeds must be a JSON array")?;
    let seeds = inputs
        .into_iter()
        .map(|input| match input {
            SeedInput::Term(term) => SeedKeyword::new(&term, DEFAULT_CATEGORY),
            SeedInput::Seed(seed) => SeedKeyword::new(&seed.term, seed.category),
        })
        .collect::<kwplanner_shared::Result<Vec<_>>>()?;
    if seeds.is_empty() {
        return Err(eyre!("no seed keywords given"));
    }
    Ok(seeds)
}

fn parse_locations(json: &str) -> Result<Vec<Location>> {
    let raw: Vec<Location> =
        serde_json::from_str(json).wrap_err("locations must be a JSON array")?;
    let locations = raw
        .iter()
        .map(Location::normalized)
        .collect::<kwplanner_shared::Result<Vec<_>>>()?;
    Ok(locations)
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read '{}'", path.display()))
}

/// Apply command-line overrides on top of the config file.
fn apply_overrides(
    config: &mut AppConfig,
    platform: Option<&str>,
    match_types: &[String],
) -> Result<()> {
    if let Some(platform) = platform {
        config.defaults.platform = platform.parse::<Platform>()?;
    }
    if !match_types.is_empty() {
        config.ad_groups.match_types = match_types
            .iter()
            .map(|m| m.parse::<MatchType>())
            .collect::<kwplanner_shared::Result<Vec<_>>>()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_plan(
    seeds_path: &Path,
    locations_path: Option<&Path>,
    platform: Option<&str>,
    match_types: &[String],
    json: bool,
) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, platform, match_types)?;
    validate_credentials(&config)?;

    let seeds = parse_seeds(&read_input(seeds_path)?)?;
    let locations = match locations_path {
        Some(path) => parse_locations(&read_input(path)?)?,
        None => Vec::new(),
    };

    info!(
        seeds = seeds.len(),
        locations = locations.len(),
        platform = %config.defaults.platform,
        "planning keywords"
    );

    let pipeline = KeywordPipeline::from_config(&config).await?;
    let reporter = CliProgress::new();
    let result = pipeline.run(&seeds, &locations, &reporter).await?;

    for issue in validate_ad_groups(&result.ad_groups, &pipeline.config().balance) {
        warn!(%issue, "ad group check");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &PipelineResult) {
    let stages = &result.stages;
    println!();
    println!("  Plan complete!");
    println!("  Run:        {}", result.run_id);
    println!("  Expanded:   {}", stages.expanded);
    if stages.combined > 0 {
        println!("  Combined:   {}", stages.combined);
    }
    println!("  Enriched:   {}", stages.enriched);
    println!("  Kept:       {}", stages.kept);
    println!("  Ad groups:  {}", result.ad_groups.len());
    println!(
        "  Cache:      {} hits, {} misses",
        result.cache_hits, result.cache_misses
    );
    if stages.failed_seeds > 0 || stages.failed_batches > 0 {
        println!(
            "  Failures:   {} seeds, {} metric batches",
            stages.failed_seeds, stages.failed_batches
        );
    }
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    for group in &result.ad_groups {
        let marker = if group.is_catch_all { " (catch-all)" } else { "" };
        println!(
            "  {:<48} {:>4} keywords  bid {:>7.2}  volume {:>8}{marker}",
            group.name,
            group.keywords.len(),
            group.default_bid,
            group.metadata.total_volume,
        );
    }
    if !result.ad_groups.is_empty() {
        println!();
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(format!("{name}..."));
    }

    fn stage_done(&self, name: &str, count: usize) {
        self.spinner.set_message(format!("{name}: {count}"));
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_accept_strings_and_objects() {
        let seeds = parse_seeds(r#"["Plumber", {"term": "Drain Cleaning", "category": "drains"}]"#).unwrap();
        assert_eq!(seeds[0].term, "plumber");
        assert_eq!(seeds[0].category, "general");
        assert_eq!(seeds[1].term, "drain cleaning");
        assert_eq!(seeds[1].category, "drains");
    }

    #[test]
    fn empty_or_blank_seeds_are_rejected() {
        assert!(parse_seeds("[]").is_err());
        assert!(parse_seeds(r#"["  "]"#).is_err());
        assert!(parse_seeds(r#"{"term": "plumber"}"#).is_err());
    }

    #[test]
    fn locations_are_normalized() {
        let locations = parse_locations(r#"[{"city": "Dallas", "state": "tx", "zip": "75201"}]"#).unwrap();
        assert_eq!(locations[0].state.as_deref(), Some("TX"));
        assert!(parse_locations(r#"[{}]"#).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, Some("bing"), &["exact".into(), "phrase".into()]).unwrap();
        assert_eq!(config.defaults.platform, Platform::BingAds);
        assert_eq!(
            config.ad_groups.match_types,
            vec![MatchType::Exact, MatchType::Phrase]
        );
        assert!(apply_overrides(&mut config, Some("yahoo"), &[]).is_err());
    }
}
