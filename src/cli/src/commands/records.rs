//! Display commands over the request store.
//!
//! Every command is one bridge call through `POST /rpc`.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ListArgs {
    /// Only requests sharing this correlation id (hidden ones included)
    #[arg(short, long)]
    correlation: Option<String>,
}

#[derive(Args)]
pub struct IdArgs {
    /// Request id
    request_id: String,
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestSummary {
    method: Option<String>,
    url: Option<String>,
    status: Option<u16>,
    duration_ms: Option<f64>,
    memory_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
struct BucketCounts {
    messages: usize,
    queries: usize,
    timeline: usize,
    counters: usize,
    context_groups: usize,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordSummary {
    request_id: String,
    correlation_id: Option<String>,
    arrival_order: u64,
    first_seen_at: String,
    last_seen_at: String,
    #[serde(default)]
    summary: RequestSummary,
    #[serde(default)]
    counts: BucketCounts,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    event_count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct ContextGroup {
    label: String,
    order: i64,
    value: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct EventEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<Value>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "#")]
    order: u64,
    #[tabled(rename = "Request")]
    request_id: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Msgs")]
    messages: usize,
    #[tabled(rename = "Queries")]
    queries: usize,
}

#[derive(Tabled)]
struct MessageRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Message")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(Tabled)]
struct QueryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Query")]
    query: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

#[derive(Tabled)]
struct ContextRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn duration_label(ms: Option<f64>) -> String {
    ms.map(|d| format!("{:.1}ms", d)).unwrap_or_else(|| "-".into())
}

fn field(fields: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| fields.get(*k).filter(|v| !v.is_null()))
        .map(output::compact)
        .unwrap_or_else(|| "-".into())
}

fn record_row(r: &RecordSummary) -> RecordRow {
    RecordRow {
        order: r.arrival_order,
        request_id: output::truncate(&r.request_id, 12),
        method: r.summary.method.clone().unwrap_or_else(|| "-".into()),
        url: output::truncate(r.summary.url.as_deref().unwrap_or("-"), 40),
        status: output::status_label(r.summary.status),
        duration: duration_label(r.summary.duration_ms),
        messages: r.counts.messages,
        queries: r.counts.queries,
    }
}

fn message_row(entry: &EventEntry) -> MessageRow {
    let source = match (entry.fields.get("file"), entry.fields.get("line")) {
        (Some(file), Some(line)) => format!("{}:{}", output::compact(file), output::compact(line)),
        (Some(file), None) => output::compact(file),
        _ => "-".into(),
    };
    MessageRow {
        kind: output::type_label(&field(&entry.fields, &["type"])),
        label: field(&entry.fields, &["label"]),
        value: output::truncate(&field(&entry.fields, &["value", "message", "text"]), 60),
        source,
    }
}

/// Context rows ordered by group `order`, then by group key.
fn context_rows(context: &BTreeMap<String, ContextGroup>) -> Vec<ContextRow> {
    let mut groups: Vec<_> = context.iter().collect();
    groups.sort_by(|(ka, a), (kb, b)| a.order.cmp(&b.order).then_with(|| ka.cmp(kb)));
    groups
        .into_iter()
        .flat_map(|(_, group)| {
            group.value.iter().map(move |(key, value)| ContextRow {
                group: group.label.clone(),
                key: key.clone(),
                value: output::truncate(&output::compact(value), 60),
            })
        })
        .collect()
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn list(args: ListArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let records: Vec<RecordSummary> = match &args.correlation {
        Some(correlation) => {
            client
                .call_typed("listByCorrelation", json!({ "correlationId": correlation }))
                .await?
        }
        None => client.call_typed("listVisible", json!({})).await?,
    };
    let rows: Vec<RecordRow> = records.iter().map(record_row).collect();
    output::print_rows(&rows, &records, format)
}

pub async fn show(args: IdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let record: RecordSummary = client.lookup("summary", &args.request_id).await?;

    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Request: {}", record.request_id));
            if let Some(correlation) = &record.correlation_id {
                output::print_detail("Correlation", correlation);
            }
            output::print_detail("Arrival", &record.arrival_order.to_string());
            output::print_detail("Method", record.summary.method.as_deref().unwrap_or("-"));
            output::print_detail("URL", record.summary.url.as_deref().unwrap_or("-"));
            output::print_detail("Status", &output::status_label(record.summary.status));
            output::print_detail("Duration", &duration_label(record.summary.duration_ms));
            if let Some(memory) = record.summary.memory_bytes {
                output::print_detail("Memory", &format!("{:.1} KiB", memory as f64 / 1024.0));
            }
            output::print_detail("First Seen", &record.first_seen_at);
            output::print_detail("Last Seen", &record.last_seen_at);
            output::print_detail("Events", &record.event_count.to_string());
            output::print_detail(
                "Buckets",
                &format!(
                    "{} messages, {} queries, {} timeline, {} counters, {} context groups",
                    record.counts.messages,
                    record.counts.queries,
                    record.counts.timeline,
                    record.counts.counters,
                    record.counts.context_groups
                ),
            );
            if record.hidden {
                output::print_info("This request is hidden from the list.");
            }
            Ok(())
        }
        _ => output::print_item(&record, format),
    }
}

pub async fn context(args: IdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let context: BTreeMap<String, ContextGroup> = client.lookup("context", &args.request_id).await?;
    output::print_rows(&context_rows(&context), &context, format)
}

pub async fn messages(args: IdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let entries: Vec<EventEntry> = client.lookup("messages", &args.request_id).await?;
    let rows: Vec<MessageRow> = entries.iter().map(message_row).collect();
    output::print_rows(&rows, &entries, format)
}

pub async fn queries(args: IdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let entries: Vec<EventEntry> = client.lookup("queries", &args.request_id).await?;
    let rows: Vec<QueryRow> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| QueryRow {
            index: i + 1,
            query: output::truncate(&field(&e.fields, &["sql", "query", "value"]), 80),
            duration: field(&e.fields, &["duration", "durationMs", "time"]),
        })
        .collect();
    output::print_rows(&rows, &entries, format)
}

pub async fn hide(args: IdArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let record: RecordSummary = client.lookup("hide", &args.request_id).await?;
    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Request {} hidden", record.request_id));
            Ok(())
        }
        _ => output::print_item(&record, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_summary_parses_server_shape() {
        let record: RecordSummary = serde_json::from_value(json!({
            "requestId": "r1",
            "correlationId": null,
            "arrivalOrder": 3,
            "firstSeenAt": "2024-01-01T00:00:00Z",
            "lastSeenAt": "2024-01-01T00:00:01Z",
            "summary": {"method": "GET", "url": "/a", "status": 200, "durationMs": 1.5, "memoryBytes": null},
            "counts": {"messages": 2, "queries": 1, "timeline": 0, "counters": 0, "contextGroups": 1},
            "hidden": false,
            "eventCount": 4
        }))
        .unwrap();
        assert_eq!(record.arrival_order, 3);
        assert_eq!(record.counts.context_groups, 1);

        let row = record_row(&record);
        assert_eq!(row.method, "GET");
        assert_eq!(row.duration, "1.5ms");
    }

    #[test]
    fn test_message_row_source_and_value() {
        let entry: EventEntry = serde_json::from_value(json!({
            "type": "log", "value": "hello", "file": "app.js", "line": 12
        }))
        .unwrap();
        let row = message_row(&entry);
        assert_eq!(row.value, "hello");
        assert_eq!(row.source, "app.js:12");
        assert_eq!(row.label, "-");
    }

    #[test]
    fn test_context_rows_follow_group_order() {
        let context: BTreeMap<String, ContextGroup> = serde_json::from_value(json!({
            "a": {"label": "A", "order": 2, "value": {"x": 1}},
            "b": {"label": "B", "order": 1, "value": {"y": "z", "w": [1]}}
        }))
        .unwrap();
        let rows = context_rows(&context);
        let groups: Vec<_> = rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["B", "B", "A"]);
        assert_eq!(rows[1].value, "z");
    }
}
