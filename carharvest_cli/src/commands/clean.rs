//! The `clean` subcommand: turn a harvested dataset into an analysis-ready copy.

use std::path::PathBuf;

use anyhow::{bail, Result};
use carharvest_lib::{clean_file, CleanOptions};
use clap::Args;

use crate::output::{print_clean_table, print_json, OutputFormat};

#[derive(Args)]
pub struct CleanArgs {
    /// Dataset produced by `harvest`
    #[arg(long, default_value = "scrapped_data.csv")]
    pub input: PathBuf,

    /// Where to write the cleaned copy
    #[arg(long, default_value = "processed_data.csv")]
    pub output: PathBuf,

    /// Column to drop (repeatable). Replaces the default list when given
    #[arg(long = "drop-column")]
    pub drop_columns: Vec<String>,

    /// Keep rows that only carry identity columns
    #[arg(long)]
    pub keep_identity_only: bool,

    /// Numeric column a row must carry to be kept
    #[arg(long, default_value = "Official_Price_EGP")]
    pub price_column: String,

    /// Rows whose price column is below this value are dropped
    #[arg(long, default_value = "1000")]
    pub min_price: f64,

    /// Disable the price filter
    #[arg(long)]
    pub no_price_filter: bool,

    /// Report format: table or json
    #[arg(long, default_value = "table")]
    pub report: String,
}

pub fn run(args: &CleanArgs) -> Result<()> {
    if args.input == args.output {
        bail!("input and output must be different files");
    }

    let mut opts = CleanOptions::default();
    if !args.drop_columns.is_empty() {
        opts.drop_columns = args.drop_columns.clone();
    }
    opts.drop_identity_only = !args.keep_identity_only;
    opts.price_column = (!args.no_price_filter).then(|| args.price_column.clone());
    opts.price_floor = args.min_price;

    let report = clean_file(&args.input, &args.output, &opts)?;
    eprintln!("Processed data saved to {}", args.output.display());

    let format = match args.report.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };
    match format {
        OutputFormat::Table => print_clean_table(&report),
        OutputFormat::Json => print_json(&report),
    }
    Ok(())
}
