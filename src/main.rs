mod api;
mod cli;
mod config;
mod error;
mod format;
mod model;
mod notify;
mod operator;
mod session;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Set up tracing on stderr; `RUST_LOG` wins over the `-v` count.
fn setup_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "devterm=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::Cli::parse();
    setup_logging(args.verbose);
    cli::run(args).await
}
