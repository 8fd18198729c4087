//! kbot CLI: runs the demo menu bot. Config from env (and `.env`) plus command line flags.

use anyhow::Result;
use clap::Parser;
use kbot_cli::{load_config, run, Cli, Commands};
use kbot_core::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            token,
            mode,
            offline,
        } => {
            let config = load_config(token, mode, offline)?;
            init_tracing(&config.log)?;
            run(config).await
        }
    }
}
