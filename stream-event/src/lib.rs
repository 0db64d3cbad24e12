//! Page stream protocol: wire shape of one SSE event.
//!
//! This crate defines the discriminated union streamed while a page is being
//! generated or patched (`PHASE` .. `COMPLETE`) and the `data: <json>\n\n`
//! framing. It does not depend on the core crate: producers build
//! [`PageEvent`] values and consumers rely on [`PageEvent::is_terminal`] to
//! detect end-of-stream.

pub mod event;
pub mod sse;

pub use event::{
    CompleteResult, CompleteStatus, PageEvent, Phase, Suggestion, ToolStatus,
};
pub use sse::sse_line;
