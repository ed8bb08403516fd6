//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::{FlowKind, Screen};

/// Request to open an annotation session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Participant identifier (e.g. a Prolific id)
    pub participant_id: String,

    /// Flow to annotate (defaults to `multi_ruleset`). Kept as a string so an
    /// unknown name is answered with 400 rather than an extractor rejection.
    #[serde(default)]
    pub flow: Option<String>,
}

impl CreateSessionRequest {
    pub fn flow_kind(&self) -> Result<FlowKind, String> {
        match self.flow.as_deref() {
            None => Ok(FlowKind::MultiRuleset),
            Some(name) => name.parse(),
        }
    }
}

/// A session id together with the screen to show.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,

    pub participant_id: String,

    pub screen: Screen,
}

/// A served flow and its size.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub flow: FlowKind,

    pub total_tasks: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Sessions currently held in memory
    pub active_sessions: usize,

    /// Flows being served
    pub flows: Vec<FlowSummary>,
}
