//! Compose-phase building blocks: the event sink, deterministic block
//! projections, and the per-block AI generation path (shared with the patch
//! engine's recompose).

use serde_json::{json, Map, Value};
use stream_event::PageEvent;
use tokio::sync::mpsc;
use tracing::warn;

use crate::jsontext::parse_json_lenient;
use crate::llm::{LlmClient, LlmError, MessageChunk};
use crate::message::Message;

/// AI calls are retried this many times after the first failure.
const AI_RETRIES: u32 = 2;

/// Scope summaries injected into per-block prompts are capped at this many
/// characters to keep prompts bounded under large datasets.
const SCOPE_SUMMARY_MAX: usize = 4000;

/// Receiver closed: the client disconnected, the producer should stop.
#[derive(Debug)]
pub(crate) struct SinkClosed;

/// Ordered event producer for one request. Guards the terminal invariant:
/// at most one `COMPLETE`/`ERROR` goes out, and every send awaits (so SSE
/// backpressure suspends the engine here).
pub(crate) struct EventSink {
    tx: mpsc::Sender<PageEvent>,
    terminal_sent: bool,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<PageEvent>) -> Self {
        Self {
            tx,
            terminal_sent: false,
        }
    }

    pub(crate) async fn emit(&mut self, event: PageEvent) -> Result<(), SinkClosed> {
        if event.is_terminal() {
            if self.terminal_sent {
                return Ok(());
            }
            self.terminal_sent = true;
        }
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// How a component's AI output is handled on the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Character-forwarded markdown.
    Text,
    /// Buffered, then parsed as JSON at completion.
    Json,
}

pub(crate) fn ai_output_format(component_type: &str) -> OutputFormat {
    match component_type {
        "suggestion_list" | "question_generator" => OutputFormat::Json,
        _ => OutputFormat::Text,
    }
}

fn ai_system_prompt(component_type: &str) -> String {
    match ai_output_format(component_type) {
        OutputFormat::Text => "You write one block of an analytics page for a teacher. \
             Ground every statement in the provided data and computed statistics; never invent \
             numbers. Be concrete and keep it under 250 words. Respond with markdown text only."
            .to_string(),
        OutputFormat::Json => {
            let schema = match component_type {
                "suggestion_list" => {
                    r#"{"suggestions": [{"title": "...", "detail": "...", "priority": "high|medium|low"}]}"#
                }
                _ => {
                    r#"{"questions": [{"question": "...", "answer": "...", "difficulty": "easy|medium|hard"}]}"#
                }
            };
            format!(
                "You write one block of an analytics page for a teacher. Ground your output in \
                 the provided data and computed statistics. Respond with JSON only, exactly this \
                 shape:\n{schema}"
            )
        }
    }
}

fn summarize_scope(value: &Value) -> String {
    let mut text = serde_json::to_string(value).unwrap_or_default();
    if text.len() > SCOPE_SUMMARY_MAX {
        text.truncate(SCOPE_SUMMARY_MAX);
        text.push_str("...");
    }
    text
}

/// Output of one AI block: the structured content plus the raw text (for the
/// legacy concatenated `MESSAGE` event).
pub(crate) struct AiBlockOutput {
    pub(crate) content: Value,
    pub(crate) text: String,
}

/// Streams one AI-filled block: `BLOCK_START`, a `SLOT_DELTA` per chunk,
/// `BLOCK_COMPLETE`. The first attempt streams; retries fall back to a
/// buffered call with a single delta. Structured outputs are parsed at
/// completion, tolerating code fences.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn generate_ai_block(
    llm: &dyn LlmClient,
    block_id: &str,
    component_type: &str,
    props: &Value,
    data: &Value,
    compute: &Value,
    extra_instruction: &str,
    sink: &mut EventSink,
) -> Result<AiBlockOutput, LlmError> {
    sink.emit(PageEvent::BlockStart {
        block_id: block_id.to_string(),
        component_type: component_type.to_string(),
    })
    .await
    .map_err(|_| LlmError::Provider("consumer disconnected".into()))?;

    let title = props.get("title").and_then(Value::as_str).unwrap_or("");
    let mut user = format!(
        "Block: {component_type}{}\n\nData:\n{}\n\nComputed statistics:\n{}",
        if title.is_empty() {
            String::new()
        } else {
            format!(" titled {title:?}")
        },
        summarize_scope(data),
        summarize_scope(compute),
    );
    if let Some(instruction) = props.get("instruction").and_then(Value::as_str) {
        user.push_str(&format!("\n\nInstruction: {instruction}"));
    }
    if !extra_instruction.is_empty() {
        user.push_str(&format!("\n\nChange request: {extra_instruction}"));
    }
    let messages = [
        Message::system(ai_system_prompt(component_type)),
        Message::user(user),
    ];

    let mut text = String::new();
    let mut last_err: Option<LlmError> = None;
    for attempt in 0..=AI_RETRIES {
        if attempt == 0 {
            // First attempt streams chunk by chunk.
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<MessageChunk>(64);
            let invoke = llm.invoke_stream(&messages, Some(chunk_tx));
            let forward = async {
                let mut closed = false;
                while let Some(chunk) = chunk_rx.recv().await {
                    if closed {
                        continue; // drain so the producer never blocks
                    }
                    if sink
                        .emit(PageEvent::SlotDelta {
                            block_id: block_id.to_string(),
                            slot_key: "content".to_string(),
                            delta_text: chunk.content,
                        })
                        .await
                        .is_err()
                    {
                        closed = true;
                    }
                }
                closed
            };
            let (result, closed) = tokio::join!(invoke, forward);
            if closed {
                return Err(LlmError::Provider("consumer disconnected".into()));
            }
            match result {
                Ok(response) => {
                    text = response.content;
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!(block_id, error = %e, "AI block stream failed, retrying buffered");
                    last_err = Some(e);
                }
            }
        } else {
            match llm.invoke(&messages).await {
                Ok(response) => {
                    text = response.content;
                    let _ = sink
                        .emit(PageEvent::SlotDelta {
                            block_id: block_id.to_string(),
                            slot_key: "content".to_string(),
                            delta_text: text.clone(),
                        })
                        .await;
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!(block_id, attempt, error = %e, "AI block retry failed");
                    last_err = Some(e);
                }
            }
        }
    }
    if let Some(e) = last_err {
        return Err(e);
    }

    let content = match ai_output_format(component_type) {
        OutputFormat::Text => json!({"markdown": text}),
        OutputFormat::Json => match parse_json_lenient(&text) {
            Some(v) => v,
            None => {
                warn!(block_id, "structured AI output unparsable, degrading to markdown");
                json!({"markdown": text})
            }
        },
    };

    sink.emit(PageEvent::BlockComplete {
        block_id: block_id.to_string(),
    })
    .await
    .map_err(|_| LlmError::Provider("consumer disconnected".into()))?;

    Ok(AiBlockOutput { content, text })
}

/// Deterministic projection of a bound value into component content. No LLM.
pub(crate) fn project_block(component_type: &str, bound: &Value, props: &Value) -> Value {
    match component_type {
        "kpi_grid" => project_kpi_grid(bound, props),
        "chart" => project_chart(bound, props),
        "table" => project_table(bound, props),
        "markdown" => json!({
            "markdown": props.get("text").and_then(Value::as_str).unwrap_or_default()
        }),
        _ => bound.clone(),
    }
}

fn project_kpi_grid(bound: &Value, props: &Value) -> Value {
    // Explicit items win; each item's value may already be resolved.
    if let Some(items) = props.get("items").and_then(Value::as_array) {
        return json!({ "items": items });
    }
    // Otherwise derive the standard tuple set from a stats object.
    let mut items = Vec::new();
    let labeled = [
        ("mean", "Average"),
        ("median", "Median"),
        ("max", "Highest"),
        ("min", "Lowest"),
        ("count", "Submissions"),
    ];
    for (key, label) in labeled {
        if let Some(v) = bound.get(key) {
            let status = match (key, v.as_f64()) {
                ("mean", Some(m)) if m < 60.0 => "warning",
                ("min", Some(m)) if m < 60.0 => "warning",
                _ => "normal",
            };
            items.push(json!({
                "label": label,
                "value": v,
                "status": status,
                "subtext": Value::Null,
            }));
        }
    }
    json!({ "items": items })
}

fn project_chart(bound: &Value, props: &Value) -> Value {
    let chart_type = props
        .get("chartType")
        .and_then(Value::as_str)
        .unwrap_or("bar");

    // A stats object with a distribution becomes a bucket chart.
    if let Some(distribution) = bound.get("distribution").and_then(Value::as_array) {
        let x: Vec<Value> = distribution
            .iter()
            .filter_map(|d| d.get("bucket").cloned())
            .collect();
        let counts: Vec<Value> = distribution
            .iter()
            .filter_map(|d| d.get("count").cloned())
            .collect();
        return json!({
            "chartType": chart_type,
            "xAxis": x,
            "series": [{"name": "Students", "data": counts}]
        });
    }

    // Row arrays are projected through xField/yField.
    if let Some(rows) = bound.as_array() {
        let x_field = props
            .get("xField")
            .and_then(Value::as_str)
            .unwrap_or("studentName");
        let y_field = props.get("yField").and_then(Value::as_str).unwrap_or("score");
        let x: Vec<Value> = rows
            .iter()
            .map(|r| r.get(x_field).cloned().unwrap_or(Value::Null))
            .collect();
        let y: Vec<Value> = rows
            .iter()
            .map(|r| r.get(y_field).cloned().unwrap_or(Value::Null))
            .collect();
        return json!({
            "chartType": chart_type,
            "xAxis": x,
            "series": [{"name": y_field, "data": y}]
        });
    }

    json!({"chartType": chart_type, "xAxis": [], "series": []})
}

fn project_table(bound: &Value, props: &Value) -> Value {
    let Some(rows) = bound.as_array() else {
        return json!({"columns": [], "rows": []});
    };
    let columns: Vec<String> = match props.get("columns").and_then(Value::as_array) {
        Some(cols) => cols
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => rows
            .first()
            .and_then(Value::as_object)
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default(),
    };
    let projected: Vec<Value> = rows
        .iter()
        .map(|r| {
            let mut out = Map::new();
            for c in &columns {
                out.insert(c.clone(), r.get(c).cloned().unwrap_or(Value::Null));
            }
            Value::Object(out)
        })
        .collect();
    json!({"columns": columns, "rows": projected})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kpi_grid_derives_tuples_from_stats() {
        let stats = json!({"mean": 55.2, "median": 58.0, "max": 91.0, "min": 22.0, "count": 6});
        let content = project_block("kpi_grid", &stats, &json!({}));
        let items = content["items"].as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0]["label"], "Average");
        assert_eq!(items[0]["status"], "warning");
        assert_eq!(items[2]["status"], "normal");
    }

    #[test]
    fn chart_projects_distribution_buckets() {
        let stats = json!({"distribution": [
            {"bucket": "0-59", "count": 2},
            {"bucket": "60-69", "count": 1}
        ]});
        let content = project_block("chart", &stats, &json!({}));
        assert_eq!(content["xAxis"], json!(["0-59", "60-69"]));
        assert_eq!(content["series"][0]["data"], json!([2, 1]));
    }

    #[test]
    fn chart_projects_rows_via_fields() {
        let rows = json!([
            {"studentName": "A", "score": 80.0},
            {"studentName": "B", "score": 60.0}
        ]);
        let content = project_block(
            "chart",
            &rows,
            &json!({"xField": "studentName", "yField": "score"}),
        );
        assert_eq!(content["xAxis"], json!(["A", "B"]));
        assert_eq!(content["series"][0]["data"], json!([80.0, 60.0]));
    }

    #[test]
    fn table_uses_declared_columns() {
        let rows = json!([
            {"studentName": "A", "score": 80.0, "status": "graded"}
        ]);
        let content = project_block(
            "table",
            &rows,
            &json!({"columns": ["studentName", "score"]}),
        );
        assert_eq!(content["columns"], json!(["studentName", "score"]));
        assert_eq!(content["rows"][0], json!({"studentName": "A", "score": 80.0}));
    }

    #[tokio::test]
    async fn sink_allows_only_one_terminal_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx);
        sink.emit(PageEvent::failed("first", "data_error"))
            .await
            .unwrap();
        sink.emit(PageEvent::failed("second", "ai_error"))
            .await
            .unwrap();
        drop(sink);
        let mut terminals = 0;
        while let Some(ev) = rx.recv().await {
            if ev.is_terminal() {
                terminals += 1;
            }
        }
        assert_eq!(terminals, 1);
    }
}
