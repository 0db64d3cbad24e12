//! Event types for the page stream: type + payload, discriminated on `type`.
//! Variant names are UPPER_SNAKE on the wire; payload keys are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution phase of the page engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Data,
    Compute,
    Compose,
}

/// Outcome of one tool invocation as reported on the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Terminal status carried by `COMPLETE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompleteStatus {
    Completed,
    Error,
}

/// One clickable choice attached to a `DATA_ERROR` (e.g. a sibling assignment).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub label: String,
    pub value: String,
}

/// Payload of a successful `COMPLETE`: the rendered page plus the scopes the
/// patch engine needs for later recompose calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResult {
    pub page: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_results: Option<Value>,
}

/// One event on the page stream.
///
/// A conformant producer emits events strictly ordered, with exactly one
/// terminal event (`COMPLETE`, or `ERROR` for a fatal pre-completion abort).
/// Every `SLOT_DELTA` for a block is emitted between that block's
/// `BLOCK_START` and `BLOCK_COMPLETE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageEvent {
    /// Phase delimiter; no phase-B event may precede the phase-A marker.
    #[serde(rename = "PHASE", rename_all = "camelCase")]
    Phase { phase: Phase, message: String },

    /// A tool is about to be invoked with the (already resolved) args.
    #[serde(rename = "TOOL_CALL", rename_all = "camelCase")]
    ToolCall { tool: String, args: Value },

    /// The tool returned; status only, the data stays server-side.
    #[serde(rename = "TOOL_RESULT", rename_all = "camelCase")]
    ToolResult { tool: String, status: ToolStatus },

    /// An AI-filled block starts streaming.
    #[serde(rename = "BLOCK_START", rename_all = "camelCase")]
    BlockStart {
        block_id: String,
        component_type: String,
    },

    /// Incremental text for one slot of one block.
    #[serde(rename = "SLOT_DELTA", rename_all = "camelCase")]
    SlotDelta {
        block_id: String,
        slot_key: String,
        delta_text: String,
    },

    /// The block finished; all of its deltas have been emitted.
    #[serde(rename = "BLOCK_COMPLETE", rename_all = "camelCase")]
    BlockComplete { block_id: String },

    /// Legacy concatenation of all AI text, for pre-block-granular consumers.
    #[serde(rename = "MESSAGE", rename_all = "camelCase")]
    Message { content: String },

    /// A required data binding could not be satisfied.
    #[serde(rename = "DATA_ERROR", rename_all = "camelCase")]
    DataError {
        entity: String,
        entity_type: String,
        message: String,
        #[serde(default)]
        suggestions: Vec<Suggestion>,
    },

    /// Terminal event. `status = completed` carries the page in `result`;
    /// `status = error` carries `error_type` instead.
    #[serde(rename = "COMPLETE", rename_all = "camelCase")]
    Complete {
        message: String,
        progress: u8,
        status: CompleteStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<CompleteResult>,
    },

    /// Fatal error with terminal semantics (pre-completion abort).
    #[serde(rename = "ERROR", rename_all = "camelCase")]
    Error {
        message: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl PageEvent {
    /// Builds the successful terminal event (`progress` pinned to 100).
    pub fn completed(message: impl Into<String>, result: CompleteResult) -> Self {
        PageEvent::Complete {
            message: message.into(),
            progress: 100,
            status: CompleteStatus::Completed,
            error_type: None,
            result: Some(result),
        }
    }

    /// Builds the failed terminal event with the given error kind
    /// (e.g. `data_error`, `ai_error`).
    pub fn failed(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        PageEvent::Complete {
            message: message.into(),
            progress: 100,
            status: CompleteStatus::Error,
            error_type: Some(error_type.into()),
            result: None,
        }
    }

    /// True for the events that legally end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PageEvent::Complete { .. } | PageEvent::Error { .. })
    }

    /// Serializes this event to a JSON object.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
