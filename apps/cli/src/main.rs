//! tenderflow CLI: procurement tender ingestion.
//!
//! Fetches the tenders published on a day, pulls their document bundles,
//! extracts the text and forwards one enriched record per tender.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
