//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::flow::{FlowKind, FormController, MultiRulesetFlow, Screen, SingleRuleFlow};
use crate::rubric::{Rubric, RubricRegistry};
use crate::session::SessionStore;

use super::sessions;
use super::types::*;

/// Shared application state.
pub struct AppState {
    /// Rubrics loaded at startup
    pub rubrics: RubricRegistry,
    /// One controller per served flow
    pub flows: HashMap<FlowKind, FormController>,
    /// Participant sessions (task counters)
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn controller(&self, flow: FlowKind) -> Result<&FormController, (StatusCode, String)> {
        self.flows
            .get(&flow)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Flow {} is not enabled", flow)))
    }

    fn flow_summaries(&self) -> Vec<FlowSummary> {
        let mut flows: Vec<FlowSummary> = self
            .flows
            .values()
            .map(|c| FlowSummary {
                flow: c.kind(),
                total_tasks: c.total_tasks(),
            })
            .collect();
        flows.sort_by_key(|f| f.flow.to_string());
        flows
    }
}

/// Load rubrics and every enabled flow. Any unreadable input is fatal.
pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let rubrics_path = config.rubrics_path.as_ref().map(|p| config.resolve(p));
    let rubrics = RubricRegistry::load(rubrics_path.as_deref())?;

    let mut flows = HashMap::new();

    let multi = MultiRulesetFlow::from_config(config, rubrics.clone())?;
    tracing::info!(
        "Multi-ruleset flow: {} rulesets x {} rubrics = {} tasks, logging to {}",
        multi.sequencer().ruleset_count(),
        multi.sequencer().prompt_count(),
        multi.sequencer().total(),
        multi.sink().path().display()
    );
    flows.insert(FlowKind::MultiRuleset, FormController::new(Arc::new(multi)));

    if config.single_rule.enabled {
        let single = SingleRuleFlow::from_config(config, &rubrics)?;
        tracing::info!(
            "Single-rule flow: {} rule pairs with rubric {}, logging to {}",
            config.single_rule.rule_count,
            config.single_rule.rubric_key,
            single.sink().path().display()
        );
        flows.insert(FlowKind::SingleRule, FormController::new(Arc::new(single)));
    } else {
        tracing::info!("Single-rule flow disabled");
    }

    Ok(Arc::new(AppState {
        rubrics,
        flows,
        sessions: Arc::new(SessionStore::new()),
    }))
}

/// Build the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/flows", get(list_flows))
        .route("/api/flows/:flow", get(flow_intro))
        .route("/api/rubrics", get(list_rubrics))
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/submit", post(sessions::submit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let ttl = config.session_ttl()?;

    let state = build_state(&config)?;
    Arc::clone(&state.sessions).start_cleanup_task(ttl);

    let app = router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let open = state.sessions.len().await;
    if open > 0 {
        tracing::info!("Shutting down with {} open sessions; their progress is not kept", open);
    }
    tracing::info!("Graceful shutdown complete");
}

/// Health check endpoint.
pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.sessions.len().await,
        flows: state.flow_summaries(),
    })
}

/// List served flows.
pub(super) async fn list_flows(State(state): State<Arc<AppState>>) -> Json<Vec<FlowSummary>> {
    Json(state.flow_summaries())
}

/// Introduction screen shown before a participant starts.
pub(super) async fn flow_intro(
    State(state): State<Arc<AppState>>,
    Path(flow): Path<FlowKind>,
) -> Result<Json<Screen>, (StatusCode, String)> {
    Ok(Json(state.controller(flow)?.intro_screen()))
}

/// List rubrics in task order.
pub(super) async fn list_rubrics(State(state): State<Arc<AppState>>) -> Json<Vec<Rubric>> {
    Json(state.rubrics.iter().cloned().collect())
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::flow::Stage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Config over a scratch directory holding a 2-rule original and one 2-rule revision.
    pub fn test_config(dir: &TempDir) -> Config {
        let rules = dir.path().join("rulesets");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(
            rules.join("og.jsonl"),
            "{\"id\": \"Rule 1\", \"rule\": \"Be kind.\"}\n{\"id\": \"Rule 2\", \"rule\": \"Be brief.\"}\n",
        )
        .unwrap();
        std::fs::write(
            rules.join("rev.jsonl"),
            "{\"id\": \"Rule 1\", \"rule\": \"Be kind to everyone.\"}\n{\"id\": \"Rule 2\", \"rule\": \"Use at most 20 words.\"}\n",
        )
        .unwrap();

        let mut config = Config::new(dir.path().to_path_buf());
        config.multi_ruleset.original = PathBuf::from("rulesets/og.jsonl");
        config.multi_ruleset.revised = vec![PathBuf::from("rulesets/rev.jsonl")];
        config.single_rule.original = PathBuf::from("rulesets/og.jsonl");
        config.single_rule.revised = PathBuf::from("rulesets/rev.jsonl");
        config.single_rule.rule_count = 2;
        config
    }

    #[tokio::test]
    async fn health_lists_flows() {
        let dir = TempDir::new().unwrap();
        let state = build_state(&test_config(&dir)).unwrap();
        let Json(resp) = health(State(state)).await;
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.active_sessions, 0);
        let totals: Vec<(FlowKind, usize)> =
            resp.flows.iter().map(|f| (f.flow, f.total_tasks)).collect();
        assert_eq!(
            totals,
            vec![(FlowKind::MultiRuleset, 4), (FlowKind::SingleRule, 2)]
        );
    }

    #[tokio::test]
    async fn disabled_flow_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.single_rule.enabled = false;
        let state = build_state(&config).unwrap();

        let err = flow_intro(State(Arc::clone(&state)), Path(FlowKind::SingleRule))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(screen) = flow_intro(State(state), Path(FlowKind::MultiRuleset))
            .await
            .unwrap();
        assert_eq!(screen.stage, Stage::Start);
    }

    #[test]
    fn missing_ruleset_fails_startup() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.multi_ruleset.original = PathBuf::from("rulesets/absent.jsonl");
        assert!(build_state(&config).is_err());
    }

    #[tokio::test]
    async fn rubrics_file_replaces_builtins() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        std::fs::write(
            dir.path().join("rubrics.yaml"),
            "- key: least_restrictive_means\n  name: LRM\n  explanation: e\n  details: d\n",
        )
        .unwrap();
        config.rubrics_path = Some(PathBuf::from("rubrics.yaml"));
        let state = build_state(&config).unwrap();

        let Json(rubrics) = list_rubrics(State(Arc::clone(&state))).await;
        assert_eq!(rubrics.len(), 1);
        assert_eq!(rubrics[0].name, "LRM");
        let Json(flows) = list_flows(State(state)).await;
        assert_eq!(flows[0].flow, FlowKind::MultiRuleset);
        assert_eq!(flows[0].total_tasks, 1);
    }
}
