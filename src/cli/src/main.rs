//! Reqlens CLI.
//!
//! Sends test traffic to the ingestion port and inspects aggregated requests
//! through the server's bridge endpoint.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{health, records, send};
use output::OutputFormat;

/// Reqlens - per-request telemetry inspector
#[derive(Parser)]
#[command(
    name = "reqlens",
    version,
    about = "Reqlens - per-request telemetry inspector",
    long_about = "Send test events to a Reqlens server and inspect the requests it has aggregated.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "REQLENS_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send generated events or a JSON fixture to the ingestion port
    Send(send::SendArgs),

    /// List visible requests, newest first
    List(records::ListArgs),

    /// Show one request's summary
    Show(records::IdArgs),

    /// Show a request's context groups
    Context(records::IdArgs),

    /// Show a request's messages
    Messages(records::IdArgs),

    /// Show a request's queries
    Queries(records::IdArgs),

    /// Hide a request from the list
    Hide(records::IdArgs),

    /// Check server health
    Health(health::HealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let client = client::ApiClient::new(&cli.api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Send(args) => send::execute(args, format).await,
        Commands::List(args) => records::list(args, &client, format).await,
        Commands::Show(args) => records::show(args, &client, format).await,
        Commands::Context(args) => records::context(args, &client, format).await,
        Commands::Messages(args) => records::messages(args, &client, format).await,
        Commands::Queries(args) => records::queries(args, &client, format).await,
        Commands::Hide(args) => records::hide(args, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
