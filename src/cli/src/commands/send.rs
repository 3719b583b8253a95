//! Test traffic generator.
//!
//! Writes a batch of events to the ingestion port, either generated log
//! messages or the contents of a JSON fixture file, then closes the
//! connection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum MessageType {
    Random,
    Log,
    Info,
    Warn,
    Error,
}

impl MessageType {
    const CONCRETE: [MessageType; 4] = [Self::Log, Self::Info, Self::Warn, Self::Error];

    fn as_str(self) -> &'static str {
        match self {
            Self::Random | Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn samples(self) -> &'static [&'static str] {
        match self {
            Self::Random | Self::Log => &[
                "Request received at /api/healthcheck",
                "Session token parsed successfully",
                "Configuration file loaded from ./config/app.json",
                "Middleware chain executed for route /api/users",
                "Cache lookup attempted for key=user_102",
            ],
            Self::Info => &[
                "Application started on port 3000",
                "User authenticated: user_id=102",
                "Scheduled job executed: cleanup-cache",
                "Background worker started: worker_id=7",
            ],
            Self::Warn => &[
                "Disk usage at 78% capacity",
                "API response time exceeded threshold: 1200ms",
                "Deprecated endpoint accessed: /v1/orders",
                "Slow query detected: SELECT * FROM orders (2.3s)",
            ],
            Self::Error => &[
                "Database connection failed: timeout after 5000ms",
                "Unhandled exception in request handler",
                "External API call failed: 503 Service Unavailable",
                "Worker process crashed with exit code 1",
            ],
        }
    }
}

const SAMPLE_FILES: [&str; 7] = [
    "index.js", "app.js", "server.js", "main.js", "app.ts", "server.ts", "main.ts",
];

#[derive(Args)]
pub struct SendArgs {
    /// Ingestion host
    #[arg(long, default_value = "localhost", env = "REQLENS_INGEST_HOST")]
    host: String,

    /// Ingestion port
    #[arg(short, long, default_value_t = 3333, env = "REQLENS_INGEST_PORT")]
    port: u16,

    /// Send the contents of a JSON fixture file instead of generated events
    #[arg(short, long, conflicts_with_all = ["count", "kind", "label", "value", "file", "line"])]
    fixture: Option<PathBuf>,

    /// Number of events to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Message type of generated events
    #[arg(short = 't', long = "type", value_enum, default_value = "random")]
    kind: MessageType,

    /// Label attached to each generated event
    #[arg(long)]
    label: Option<String>,

    /// Message content (random sample when omitted)
    #[arg(long)]
    value: Option<String>,

    /// Source file (random when omitted)
    #[arg(long)]
    file: Option<String>,

    /// Source line (random when omitted)
    #[arg(long)]
    line: Option<u32>,

    /// Request id for the batch (fresh UUID when omitted)
    #[arg(long)]
    request_id: Option<String>,

    /// Correlation id for the batch (fresh UUID when omitted)
    #[arg(long)]
    correlation_id: Option<String>,
}

/// Uniform pick from a non-empty constant table.
fn pick<'a, T>(rng: &mut impl Rng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

/// Build `count` message events sharing one request and correlation id.
fn generate(args: &SendArgs) -> Vec<Value> {
    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let correlation_id = args
        .correlation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut rng = rand::rng();

    (0..args.count)
        .map(|_| {
            let kind = match args.kind {
                MessageType::Random => *pick(&mut rng, &MessageType::CONCRETE),
                other => other,
            };

            let mut event = Map::new();
            event.insert("requestId".into(), json!(request_id));
            event.insert("correlationId".into(), json!(correlation_id));
            event.insert("type".into(), json!(kind.as_str()));
            event.insert(
                "timestamp".into(),
                json!(chrono::Utc::now().timestamp_millis()),
            );
            if let Some(label) = &args.label {
                event.insert("label".into(), json!(label));
            }
            let value = match &args.value {
                Some(v) => v.clone(),
                None => pick(&mut rng, kind.samples()).to_string(),
            };
            event.insert("value".into(), json!(value));
            let file = match &args.file {
                Some(f) => f.clone(),
                None => pick(&mut rng, &SAMPLE_FILES).to_string(),
            };
            event.insert("file".into(), json!(file));
            let line = args.line.unwrap_or_else(|| rng.random_range(1..=1000));
            event.insert("line".into(), json!(line));

            Value::Object(event)
        })
        .collect()
}

/// Read a fixture; it must hold one event object or an array of them.
fn load_fixture(path: &Path) -> Result<Vec<u8>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_slice(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    if !(parsed.is_object() || parsed.is_array()) {
        anyhow::bail!("{} must contain an event object or an array of events", path.display());
    }
    Ok(content)
}

pub async fn execute(args: SendArgs, format: OutputFormat) -> Result<()> {
    let (payload, count) = match &args.fixture {
        Some(path) => {
            let bytes = load_fixture(path)?;
            let count = match serde_json::from_slice::<Value>(&bytes)? {
                Value::Array(items) => items.len(),
                _ => 1,
            };
            (bytes, count)
        }
        None => {
            let events = generate(&args);
            let count = events.len();
            (serde_json::to_vec(&events)?, count)
        }
    };

    let addr = format!("{}:{}", args.host, args.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Could not connect to {}", addr))?;
    stream
        .write_all(&payload)
        .await
        .with_context(|| format!("Failed to write to {}", addr))?;
    stream.shutdown().await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Sent {} event(s) to {}", count, addr));
        }
        _ => {
            let sent: Value = serde_json::from_slice(&payload)?;
            output::print_item(&json!({ "target": addr, "count": count, "events": sent }), format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SendArgs,
    }

    fn parse(argv: &[&str]) -> SendArgs {
        Harness::parse_from(std::iter::once("send").chain(argv.iter().copied())).args
    }

    #[test]
    fn test_generated_batch_shares_ids() {
        let events = generate(&parse(&["-n", "5"]));
        assert_eq!(events.len(), 5);
        let id = &events[0]["requestId"];
        assert!(events.iter().all(|e| &e["requestId"] == id));
        assert!(events.iter().all(|e| e["correlationId"] == events[0]["correlationId"]));
    }

    #[test]
    fn test_random_type_resolves_to_concrete_type() {
        let events = generate(&parse(&["-n", "20"]));
        for event in events {
            let kind = event["type"].as_str().unwrap();
            assert!(["log", "info", "warn", "error"].contains(&kind));
            let line = event["line"].as_u64().unwrap();
            assert!((1..=1000).contains(&line));
        }
    }

    #[test]
    fn test_explicit_fields_are_used() {
        let events = generate(&parse(&[
            "-t", "warn", "--value", "disk", "--file", "a.rs", "--line", "7",
            "--label", "io", "--request-id", "r1",
        ]));
        assert_eq!(events[0]["type"], "warn");
        assert_eq!(events[0]["value"], "disk");
        assert_eq!(events[0]["file"], "a.rs");
        assert_eq!(events[0]["line"], 7);
        assert_eq!(events[0]["label"], "io");
        assert_eq!(events[0]["requestId"], "r1");
    }

    #[test]
    fn test_label_omitted_when_absent() {
        let events = generate(&parse(&[]));
        assert!(events[0].get("label").is_none());
    }

    #[test]
    fn test_fixture_must_be_object_or_array() {
        let mut scalar = tempfile::NamedTempFile::new().unwrap();
        scalar.write_all(b"42").unwrap();
        assert!(load_fixture(scalar.path()).is_err());

        let mut batch = tempfile::NamedTempFile::new().unwrap();
        batch.write_all(br#"[{"requestId":"r1"}]"#).unwrap();
        assert!(load_fixture(batch.path()).is_ok());

        let mut single = tempfile::NamedTempFile::new().unwrap();
        single.write_all(br#"{"requestId":"r1","type":"log"}"#).unwrap();
        assert!(load_fixture(single.path()).is_ok());
    }

    #[test]
    fn test_pick_covers_whole_table() {
        let mut rng = rand::rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(*pick(&mut rng, &MessageType::CONCRETE));
        }
        assert_eq!(seen.len(), MessageType::CONCRETE.len());
    }
}
