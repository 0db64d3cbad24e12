//! SSE framing: one event becomes one `data: <json>\n\n` line.
//!
//! Framing only; HTTP headers (`Content-Type: text/event-stream`,
//! `Cache-Control: no-cache, no-transform`) are the server's business.

use crate::event::PageEvent;

/// Serializes the event and wraps it in an SSE data line.
pub fn sse_line(event: &PageEvent) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {}\n\n", json))
}
