//! wikidb CLI - wiki page database service
//!
//! - `serve`: boot the database service and relay NDJSON envelopes from stdin
//! - `queries`: print the SQL catalog the service would load

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod front;
mod tracing_setup;

/// Stdin is read on a blocking thread that cannot be cancelled; the runtime
/// stops waiting for it after this long.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    name = "wikidb",
    author,
    version,
    about = "Message-driven database service for wiki pages",
    long_about = "Runs the wiki database service on an in-process message bus. Requests are \
                  read as JSON envelopes, one per line, and replies are written to stdout."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the database service and read envelopes from stdin
    Serve(commands::serve::ServeArgs),
    /// Print the SQL query catalog
    Queries(commands::queries::QueriesArgs),
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let outcome = runtime.block_on(run(cli));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    outcome
}

async fn run(cli: Cli) -> Result<()> {
    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    let outcome = match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await,
        Commands::Queries(args) => commands::run_queries(args),
    };

    tracing_setup::shutdown_otel();
    outcome
}
