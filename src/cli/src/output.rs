//! Output formatting for the Reqlens CLI.
//!
//! Records render as tables or key/value blocks; JSON and YAML dump the
//! server's data unchanged.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use serde_json::Value;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}

/// Print rows as a table, or the raw value as JSON/YAML.
pub fn print_rows<T: Tabled, R: Serialize + ?Sized>(rows: &[T], raw: &R, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No results found.".dimmed());
                return Ok(());
            }
            let table = Table::new(rows)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::left()))
                .to_string();
            println!("{}", table);
            Ok(())
        }
        _ => print_item(raw, format),
    }
}

/// Print a single item as JSON (also used for table mode) or YAML.
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(item)?);
        }
    }
    Ok(())
}

pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Colour an HTTP status by class.
pub fn status_label(status: Option<u16>) -> String {
    match status {
        Some(s @ 200..=299) => s.to_string().green().to_string(),
        Some(s @ 300..=399) => s.to_string().cyan().to_string(),
        Some(s @ 400..=499) => s.to_string().yellow().to_string(),
        Some(s) => s.to_string().red().to_string(),
        None => "-".dimmed().to_string(),
    }
}

/// Colour a message type the way log levels are usually coloured.
pub fn type_label(kind: &str) -> String {
    match kind {
        "error" => kind.red().bold().to_string(),
        "warn" | "warning" => kind.yellow().to_string(),
        "info" => kind.blue().to_string(),
        _ => kind.normal().to_string(),
    }
}

/// One-line rendering of a JSON value for table cells.
pub fn compact(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate to `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
