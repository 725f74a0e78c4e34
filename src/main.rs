mod cli;
mod client;
mod clock;
mod config;
mod launch;
mod logging;
mod model;
mod orchestrator;
mod supervisor;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let one_shot = args.is_one_shot();

    cli::run(args).await?;
    if one_shot {
        // Do not wait on lingering blocking reads from check tasks.
        std::process::exit(0);
    }
    Ok(())
}
