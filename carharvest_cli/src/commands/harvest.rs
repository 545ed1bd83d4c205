//! The `harvest` subcommand: crawl the catalog into a CSV dataset.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use carharvest_lib::catalog_client::{Client, DEFAULT_BASE_URL};
use carharvest_lib::{
    append_error_log, write_dataset_file, CatalogLayout, DocumentFetcher, ErrorEntry,
    FieldMapping, HarvestError, HarvestOptions, HarvestOrchestrator, HarvestRun, RatePolicy,
    UnitState, DEFAULT_CATALOG_PATH,
};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{print_json, print_summary_table, OutputFormat};

/// Arguments for the `harvest` subcommand.
#[derive(Args)]
pub struct HarvestArgs {
    /// Field mapping file (.yaml, .yml or .csv). Defaults to the built-in mapping
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Dataset CSV to write
    #[arg(long, default_value = "scrapped_data.csv")]
    pub output: PathBuf,

    /// Error log to append to
    #[arg(long, default_value = "error_log.txt")]
    pub error_log: PathBuf,

    /// Only harvest these brands (repeatable, case-insensitive)
    #[arg(long = "brand")]
    pub brands: Vec<String>,

    /// Skip these brands (repeatable, case-insensitive)
    #[arg(long = "exclude-brand")]
    pub exclude_brands: Vec<String>,

    /// Lower bound of the delay between requests in milliseconds
    #[arg(long)]
    pub min_delay_ms: Option<u64>,

    /// Upper bound of the delay between requests in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Extra random delay added to every gap, in milliseconds
    #[arg(long)]
    pub jitter_ms: Option<u64>,

    /// Minimum gap before the first request of a new brand, in milliseconds
    #[arg(long)]
    pub brand_delay_ms: Option<u64>,

    /// Attempts per request before a transient failure becomes permanent
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Catalog site root
    #[arg(long, env = "CARHARVEST_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Path of the brand listing on the site
    #[arg(long, default_value = DEFAULT_CATALOG_PATH)]
    pub catalog_path: String,

    /// Run summary format: table or json
    #[arg(long, default_value = "table")]
    pub summary: String,
}

impl HarvestArgs {
    /// Environment defaults with command-line overrides on top.
    fn rate_policy(&self) -> RatePolicy {
        let mut policy = RatePolicy::from_env();
        if let Some(ms) = self.min_delay_ms {
            policy.min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_ms {
            policy.jitter = Duration::from_millis(ms);
        }
        if let Some(ms) = self.brand_delay_ms {
            policy.brand_delay = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_attempts {
            policy.retry.max_attempts = n;
        }
        policy
    }

    fn options(&self) -> HarvestOptions {
        HarvestOptions {
            allow_brands: self.brands.clone(),
            deny_brands: self.exclude_brands.clone(),
            layout: CatalogLayout::new(&self.catalog_path),
        }
    }
}

pub async fn run(args: &HarvestArgs) -> Result<()> {
    let format = match args.summary.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let mapping = match &args.mapping {
        Some(path) => FieldMapping::load(path).map_err(HarvestError::from),
        None => FieldMapping::builtin().map_err(HarvestError::from),
    };

    let outcome = match mapping {
        Ok(mapping) => harvest(args, &mapping).await,
        Err(err) => Err(err),
    };

    let run = match outcome {
        Ok(run) => run,
        Err(err) => {
            if let Err(log_err) = append_error_log(&args.error_log, &[ErrorEntry::fatal(&err)]) {
                eprintln!("Failed to write error log: {}", log_err);
            }
            return Err(err.into());
        }
    };

    append_error_log(&args.error_log, run.errors.entries())?;
    eprintln!(
        "Harvest complete: {} records written to {}, {} log entries in {}",
        run.records.len(),
        args.output.display(),
        run.errors.len(),
        args.error_log.display()
    );

    match format {
        OutputFormat::Table => print_summary_table(&run.summary),
        OutputFormat::Json => print_json(&run.summary),
    }
    Ok(())
}

async fn harvest(args: &HarvestArgs, mapping: &FieldMapping) -> Result<HarvestRun, HarvestError> {
    let policy = args.rate_policy();
    policy.validate().map_err(HarvestError::InvalidPolicy)?;

    let client = Client::with_base_url(&args.base_url)?;
    let fetcher = DocumentFetcher::new(client, policy);
    eprintln!(
        "Harvesting {}{} with {} field rules",
        args.base_url.trim_end_matches('/'),
        args.catalog_path,
        mapping.len()
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let outcome = HarvestOrchestrator::new(&fetcher, mapping, args.options())
        .with_observer(|event| {
            if event.state == UnitState::InFlight {
                pb.set_message(format!("{} records | {} {}", event.admitted, event.scope, event.label));
            }
        })
        .run()
        .await;
    pb.finish_and_clear();

    let run = outcome?;
    write_dataset_file(&args.output, mapping.columns(), &run.records)?;
    Ok(run)
}
