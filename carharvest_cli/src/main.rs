mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "carharvest")]
#[command(about = "Harvest new-car trim specifications into a CSV dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the catalog and write the dataset
    Harvest(Box<commands::harvest::HarvestArgs>),
    /// Validate a field mapping file and print its schema
    CheckMapping(commands::check_mapping::CheckMappingArgs),
    /// Post-process a harvested dataset
    Clean(commands::clean::CleanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carharvest=info".parse().unwrap())
                .add_directive("carharvest_lib=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Harvest(args) => commands::harvest::run(args.as_ref()).await?,
        Commands::CheckMapping(args) => commands::check_mapping::run(args)?,
        Commands::Clean(args) => commands::clean::run(args)?,
    }

    Ok(())
}
