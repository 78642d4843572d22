//! logleash entry point: parses the CLI, sets up logging, and starts the
//! pipeline runtime in `app`.

mod app;
mod cli;
mod dispatch;
mod error;
mod parser;
mod record;
mod sample;
mod sink;
mod state;
mod stats;
mod tail;
mod transform;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::Invocation;
use crate::parser::ParserKind;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match cli::parse()? {
        Invocation::ListParsers => {
            println!("Available parsers: {}", ParserKind::names().join(", "));
            return Ok(());
        }
        Invocation::Run(config) => *config,
    };

    init_logging(config.debug)?;
    app::run(config).await?;
    Ok(())
}

/// Logs go to stderr; stdout carries the events. `RUST_LOG` wins over
/// `--debug`.
fn init_logging(debug: bool) -> Result<()> {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}
