mod config;
mod output;

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aidflow_core::{ActivityRecord, NameTables, OrgRegistry};
use aidflow_engine::{ErrorsOnExit, FallbackCodes, InclusionFilter, Pipeline, RateTable, Theme};

use config::RunConfig;

/// Attribute humanitarian-aid transactions and money flows for one
/// analysis theme.
#[derive(Parser)]
#[command(name = "aidflow", version)]
struct Cli {
    /// TOML run configuration
    #[arg(long, short, env = "AIDFLOW_CONFIG")]
    config: PathBuf,

    /// Flattened activity records (JSON array)
    #[arg(long, short)]
    input: PathBuf,

    /// Override the configured output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Override the configured theme
    #[arg(long)]
    theme: Option<String>,

    /// Override the configured window start (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = RunConfig::load(&cli.config)?;
    if let Some(theme) = cli.theme {
        config.theme = theme;
    }
    if let Some(start_date) = cli.start_date {
        config.start_date = Some(start_date);
    }
    if let Some(dir) = cli.output_dir {
        config.output.dir = dir;
    }

    let mut theme = Theme::by_name(&config.theme)?;
    let overrides = &config.theme_overrides;
    if overrides.excluded_aid_types.is_some() {
        theme.excluded_aid_types = overrides.excluded_aid_types.clone();
    }
    if overrides.relevant_countries.is_some() {
        theme.relevant_countries = overrides.relevant_countries.clone();
    }
    if overrides.relevant_sectors.is_some() {
        theme.relevant_sectors = overrides.relevant_sectors.clone();
    }
    if let Some(words) = &overrides.relevant_words {
        theme.relevant_words = Some(words.iter().map(|w| w.to_lowercase()).collect());
    }

    let today = Utc::now().date_naive();
    let range = config.date_range(today)?;

    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading records from {}", cli.input.display()))?;
    let records: Vec<ActivityRecord> = serde_json::from_str(&text)
        .with_context(|| format!("parsing records from {}", cli.input.display()))?;
    tracing::info!(
        records = records.len(),
        theme = %config.theme,
        "loaded activity records"
    );

    let names = NameTables::from_files(
        &config.paths.sectors,
        &config.paths.countries,
        &config.paths.regions,
        theme.flat_sectors,
        &config.default_sector,
        &config.default_country,
    )?;
    let rates = RateTable::from_files(&config.paths.rates, &config.paths.fallback_rates)?;

    let registry = OrgRegistry::new(config.blocklist(), &config.default_org);
    let filter = InclusionFilter::new(
        theme,
        config.skip_rules(),
        range,
        config.usd_error_threshold,
    );
    let mut pipeline = Pipeline::new(
        filter,
        registry,
        names,
        FallbackCodes {
            country: config.fallback_country_code.clone(),
            sector: config.fallback_sector_code.clone(),
        },
    );

    let mut errors = ErrorsOnExit::new();
    let run_output = pipeline.run(&records, &rates, &mut errors);

    output::write_all(
        &config.output.dir,
        &run_output,
        &config.theme,
        &today.to_string(),
        &config.output.transactions,
        &config.output.flows,
        &config.output.reporting_orgs,
        &config.output.json,
    )?;

    if !errors.is_empty() {
        tracing::warn!(count = errors.len(), "data-quality problems this run:");
        errors.log_all();
    }
    tracing::info!(
        transactions = run_output.transactions.len(),
        flows = run_output.flows.len(),
        skipped = run_output.skipped,
        output_dir = %config.output.dir.display(),
        "run complete"
    );

    Ok(())
}
