//! HTTP API for the annotation form.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/flows` - List served flows with their task counts
//! - `GET /api/flows/:flow` - Introduction screen for a flow
//! - `GET /api/rubrics` - List rubrics in task order
//! - `POST /api/sessions` - Start annotating as a participant
//! - `GET /api/sessions/:id` - Current screen for a session
//! - `POST /api/sessions/:id/submit` - Submit the current task and advance

mod routes;
mod sessions;
pub mod types;

pub use routes::{build_state, router, serve, AppState};
pub use types::*;
