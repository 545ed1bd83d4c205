//! The `check-mapping` subcommand.

use std::path::PathBuf;

use anyhow::Result;
use carharvest_lib::FieldMapping;
use clap::Args;

use crate::output::{print_json, print_schema_table, OutputFormat};

#[derive(Args)]
pub struct CheckMappingArgs {
    /// Mapping file to validate (.yaml, .yml or .csv)
    pub path: PathBuf,

    /// Output format: table or json
    #[arg(long, default_value = "table")]
    pub output: String,
}

pub fn run(args: &CheckMappingArgs) -> Result<()> {
    let mapping = FieldMapping::load(&args.path)?;
    eprintln!(
        "{} is valid: {} columns, {} distinct labels",
        args.path.display(),
        mapping.len(),
        mapping.labels().count()
    );

    let format = match args.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };
    match format {
        OutputFormat::Table => print_schema_table(&mapping),
        OutputFormat::Json => print_json(&mapping.rules()),
    }
    Ok(())
}
