//! HTTP layer: axum router over the lectern service.
//!
//! `/api/conversation` and `/api/workflow/generate` are plain JSON;
//! `/api/page/generate` and `/api/page/patch` stream SSE until the single
//! terminal `COMPLETE`. Pre-stream errors surface as 4xx/5xx with
//! `{success: false, error}`; once a stream has started, errors only ever
//! surface as events.

mod app;
mod routes;
mod run;

pub use app::{router, AppState};
pub use run::run;
