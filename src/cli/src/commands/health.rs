//! Health check command.
//!
//! Queries the `/health` endpoint and reports store availability.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Also check the Prometheus endpoint
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    match format {
        OutputFormat::Table => {
            output::print_header("Server Health");
            output::print_detail("Status", &status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }
            if let Some(records) = health.get("records").and_then(|v| v.as_u64()) {
                output::print_detail("Records", &records.to_string());
            }
            if let Some(error) = health.get("error").and_then(|v| v.as_str()) {
                output::print_detail("Error", error);
            }
            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if args.detailed {
                let metrics = match client.get_raw_text("/metrics").await {
                    Ok(body) => format!("enabled ({} series)", body.lines().filter(|l| !l.starts_with('#')).count()),
                    Err(_) => "disabled".to_string(),
                };
                output::print_detail("Metrics", &metrics);
            }

            if status == "healthy" {
                output::print_success("Store is accepting events");
            }
        }
        _ => output::print_item(&health, format)?,
    }

    if status != "healthy" {
        anyhow::bail!("server reported status {}", status);
    }
    Ok(())
}
