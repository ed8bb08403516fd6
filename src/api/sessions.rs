//! Participant session endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::flow::{FlowError, Submission};
use crate::session::SessionHandle;

use super::routes::AppState;
use super::types::{CreateSessionRequest, SessionResponse};

async fn lookup(state: &AppState, id: Uuid) -> Result<SessionHandle, (StatusCode, String)> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {} not found", id)))
}

fn flow_error_status(err: &FlowError) -> StatusCode {
    match err {
        FlowError::Complete(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start a session at task zero.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let flow = req
        .flow_kind()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let controller = state.controller(flow)?;
    let (session, screen) = controller.start(&req.participant_id);
    let session_id = session.id;
    state.sessions.insert(session).await;

    Ok(Json(SessionResponse {
        session_id,
        participant_id: req.participant_id,
        screen,
    }))
}

/// Current screen for a session.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let handle = lookup(&state, id).await?;
    let mut session = handle.lock().await;
    session.touch();
    let screen = state.controller(session.flow)?.screen(&session);

    Ok(Json(SessionResponse {
        session_id: session.id,
        participant_id: session.participant_id.clone(),
        screen,
    }))
}

/// Record the current task and advance the session.
///
/// The write and the counter advance run on their own task, so a client that
/// disconnects mid-request cannot leave a logged record behind an unadvanced
/// counter.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(submission): Json<Submission>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let handle = lookup(&state, id).await?;

    let worker = tokio::spawn(async move {
        let mut session = handle.lock().await;
        let controller = state.controller(session.flow)?;

        let screen = match controller.submit(&mut session, &submission).await {
            Ok(screen) => screen,
            Err(e) => {
                let status = flow_error_status(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(session_id = %id, "Failed to record annotation: {}", e);
                } else {
                    tracing::warn!(session_id = %id, "Rejected submission: {}", e);
                }
                return Err((status, e.to_string()));
            }
        };

        Ok::<_, (StatusCode, String)>(Json(SessionResponse {
            session_id: session.id,
            participant_id: session.participant_id.clone(),
            screen,
        }))
    });

    worker.await.map_err(|e| {
        tracing::error!(session_id = %id, "Submission task failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Submission task failed: {}", e),
        )
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::build_state;
    use crate::api::routes::tests::test_config;
    use crate::flow::{FlowKind, RuleAnnotation, Stage, TaskAnnotation, Verdict};
    use crate::sink::AnnotationSink;
    use tempfile::TempDir;

    fn create_request(participant_id: &str, flow: FlowKind) -> Json<CreateSessionRequest> {
        Json(CreateSessionRequest {
            participant_id: participant_id.to_string(),
            flow: Some(flow.to_string()),
        })
    }

    #[tokio::test]
    async fn multi_ruleset_session_walks_to_completion() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let output = config.resolve(&config.multi_ruleset.output_path);
        let state = build_state(&config).unwrap();

        let Json(created) = create_session(
            State(Arc::clone(&state)),
            create_request("P-7", FlowKind::MultiRuleset),
        )
        .await
        .unwrap();
        assert_eq!(created.screen.stage, Stage::Annotating);
        assert_eq!(created.screen.total_tasks, 4);

        for i in 0..4 {
            let Json(resp) = submit(
                State(Arc::clone(&state)),
                Path(created.session_id),
                Json(Submission {
                    rules_listing: Some(format!("Rule {}", i)),
                    verdict: None,
                    human_reasoning: None,
                }),
            )
            .await
            .unwrap();
            assert_eq!(resp.screen.task_id, i + 1);
        }

        let Json(current) = get_session(State(Arc::clone(&state)), Path(created.session_id))
            .await
            .unwrap();
        assert_eq!(current.screen.stage, Stage::Complete);

        let records: Vec<TaskAnnotation> = AnnotationSink::new(output).read_records().await.unwrap();
        let keys: Vec<&str> = records.iter().map(|r| r.prompt_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "least_restrictive_means",
                "arbitrary_and_capricious",
                "absurdity_check",
                "logical_outgrowth_doctrine",
            ]
        );
    }

    #[tokio::test]
    async fn single_rule_scenario_logs_two_records_then_conflicts() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let output = config.resolve(&config.single_rule.output_path);
        let state = build_state(&config).unwrap();

        let Json(created) = create_session(
            State(Arc::clone(&state)),
            create_request("P-1", FlowKind::SingleRule),
        )
        .await
        .unwrap();

        for verdict in [Verdict::Pass, Verdict::Fail] {
            submit(
                State(Arc::clone(&state)),
                Path(created.session_id),
                Json(Submission {
                    rules_listing: None,
                    verdict: Some(verdict),
                    human_reasoning: Some("ok".to_string()),
                }),
            )
            .await
            .unwrap();
        }

        let err = submit(
            State(Arc::clone(&state)),
            Path(created.session_id),
            Json(Submission::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        let records: Vec<RuleAnnotation> = AnnotationSink::new(output).read_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.ruleset_index == 0
            && r.prompt_key == "least_restrictive_means"
            && r.prolific_id == "P-1"));
        assert_eq!(records[0].verdict, Some(Verdict::Pass));
        assert_eq!(records[1].verdict, Some(Verdict::Fail));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = build_state(&test_config(&dir)).unwrap();
        let err = get_session(State(state), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sink_failure_keeps_participant_on_the_same_task() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        // A directory where the log file should be makes every append fail.
        std::fs::create_dir_all(dir.path().join("blocked.jsonl")).unwrap();
        config.multi_ruleset.output_path = "blocked.jsonl".into();
        let state = build_state(&config).unwrap();

        let Json(created) = create_session(
            State(Arc::clone(&state)),
            create_request("P-3", FlowKind::MultiRuleset),
        )
        .await
        .unwrap();
        let err = submit(
            State(Arc::clone(&state)),
            Path(created.session_id),
            Json(Submission::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);

        let Json(current) = get_session(State(state), Path(created.session_id))
            .await
            .unwrap();
        assert_eq!(current.screen.task_id, 0);
    }

    #[tokio::test]
    async fn unknown_flow_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let state = build_state(&test_config(&dir)).unwrap();

        let req: CreateSessionRequest =
            serde_json::from_str(r#"{"participant_id": "P", "flow": "bogus"}"#).unwrap();
        let err = create_session(State(Arc::clone(&state)), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("bogus"));
        assert_eq!(state.sessions.len().await, 0);

        let req: CreateSessionRequest = serde_json::from_str(r#"{"participant_id": "P"}"#).unwrap();
        let Json(created) = create_session(State(state), Json(req)).await.unwrap();
        assert_eq!(created.screen.flow, FlowKind::MultiRuleset);
    }

    #[tokio::test]
    async fn dropped_submit_request_still_advances_the_session() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let output = config.resolve(&config.single_rule.output_path);
        let state = build_state(&config).unwrap();

        let Json(created) = create_session(
            State(Arc::clone(&state)),
            create_request("P-9", FlowKind::SingleRule),
        )
        .await
        .unwrap();

        // Hold the session so the request is still pending when it is abandoned.
        let handle = state.sessions.get(created.session_id).await.unwrap();
        let guard = handle.lock().await;
        let dropped = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            submit(
                State(Arc::clone(&state)),
                Path(created.session_id),
                Json(Submission {
                    rules_listing: None,
                    verdict: Some(Verdict::Warn),
                    human_reasoning: None,
                }),
            ),
        )
        .await;
        assert!(dropped.is_err());
        drop(guard);

        let mut task_id = 0;
        for _ in 0..200 {
            let Json(current) = get_session(State(Arc::clone(&state)), Path(created.session_id))
                .await
                .unwrap();
            task_id = current.screen.task_id;
            if task_id == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(task_id, 1);

        let records: Vec<RuleAnnotation> = AnnotationSink::new(output).read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, 0);
    }
}
