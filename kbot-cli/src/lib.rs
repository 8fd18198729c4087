//! # kbot-cli
//!
//! Command line for the demo menu bot: argument parsing, config loading, and [`run`],
//! which starts the bot over Telegram or, offline, over the console.

pub mod cli;
pub mod console;
pub mod demo;

use std::sync::Arc;

use anyhow::Result;
use kbot_runtime::{BotConfig, Server};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use cli::{load_config, Cli, Commands};
pub use console::{ConsoleTransport, CONSOLE_CHAT};

/// Runs the demo bot until Ctrl-C (or end of console input offline).
pub async fn run(config: BotConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let completion = if config.offline {
        info!("offline: reading the console, `#N` presses button N");
        let transport = Arc::new(ConsoleTransport::new());
        let source = console::stdin_source(&transport);
        let dispatcher = demo::routes(config.dispatcher(transport));
        Server::new(config, dispatcher, Box::new(source))
            .start(cancel, demo::menu(), stop)
            .await?
    } else {
        kbot_telegram::launch(config, demo::routes, demo::menu(), cancel, stop).await?
    };

    let report = completion.wait().await?;
    info!(
        dispatched = report.dispatched,
        aborted = report.aborted,
        "bot exited"
    );
    Ok(())
}
