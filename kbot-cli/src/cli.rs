//! CLI parser and config loading.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kbot_runtime::{BotConfig, BotMode};

#[derive(Parser)]
#[command(name = "kbot")]
#[command(about = "Keyboard-driven Telegram bot", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo menu bot (config from env; flags override it).
    Run {
        /// Overrides BOT_TOKEN.
        #[arg(short, long)]
        token: Option<String>,
        /// Overrides BOT_MODE: polling or webhook.
        #[arg(short, long)]
        mode: Option<String>,
        /// Talk to the console instead of Telegram; no token needed.
        #[arg(long)]
        offline: bool,
    },
}

/// Loads [`BotConfig`] from the environment and applies the command line overrides.
pub fn load_config(token: Option<String>, mode: Option<String>, offline: bool) -> Result<BotConfig> {
    let mut config = BotConfig::from_env()?;
    if let Some(token) = token {
        config.token = Some(token);
    }
    if let Some(mode) = mode {
        config.mode = mode.parse::<BotMode>()?;
    }
    if offline {
        config.offline = true;
    }
    Ok(config)
}
