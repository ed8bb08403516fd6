//! Form controller: drives a flow for one participant session.

use serde::Serialize;
use std::sync::Arc;

use super::{AnnotationFlow, FlowError, FlowKind, Submission, TaskView};
use crate::session::Session;

pub const COMPLETION_MESSAGE: &str =
    "# Thank you for your annotations!\nPlease feel free to exit this screen.";

/// Where a participant is in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Annotating,
    Complete,
}

/// View model returned for every form state.
///
/// Response fields are never echoed back, so the UI starts every task with
/// empty inputs.
#[derive(Debug, Clone, Serialize)]
pub struct Screen {
    pub stage: Stage,
    pub flow: FlowKind,
    pub task_id: usize,
    pub total_tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
}

fn welcome_message(participant_id: &str) -> String {
    format!(
        "## Welcome Participant {}!\n\
         If you exit or refresh the screen, you will be taken back to the start. \
         If this happens, please press **\"Submit\"** without annotating anything \
         until you get back to where you left off.\n",
        participant_id
    )
}

#[derive(Clone)]
pub struct FormController {
    flow: Arc<dyn AnnotationFlow>,
}

impl FormController {
    pub fn new(flow: Arc<dyn AnnotationFlow>) -> Self {
        Self { flow }
    }

    pub fn kind(&self) -> FlowKind {
        self.flow.kind()
    }

    pub fn total_tasks(&self) -> usize {
        self.flow.total_tasks()
    }

    /// Screen shown before the participant enters their id.
    pub fn intro_screen(&self) -> Screen {
        Screen {
            stage: Stage::Start,
            flow: self.kind(),
            task_id: 0,
            total_tasks: self.total_tasks(),
            intro: Some(self.flow.intro().to_string()),
            welcome: None,
            task: None,
            completion: None,
        }
    }

    /// Open a session at task zero for `participant_id`.
    pub fn start(&self, participant_id: &str) -> (Session, Screen) {
        let session = Session::new(self.kind(), participant_id.to_string());
        tracing::info!(
            session_id = %session.id,
            flow = %self.kind(),
            "Participant {} started annotating",
            participant_id
        );
        let screen = self.screen(&session);
        (session, screen)
    }

    /// Screen for the session's current task.
    pub fn screen(&self, session: &Session) -> Screen {
        let total_tasks = self.total_tasks();
        match self.flow.task_view(session.task_id) {
            Some(view) => Screen {
                stage: Stage::Annotating,
                flow: self.kind(),
                task_id: session.task_id,
                total_tasks,
                intro: None,
                welcome: Some(welcome_message(&session.participant_id)),
                task: Some(view),
                completion: None,
            },
            None => Screen {
                stage: Stage::Complete,
                flow: self.kind(),
                task_id: session.task_id,
                total_tasks,
                intro: None,
                welcome: None,
                task: None,
                completion: Some(COMPLETION_MESSAGE.to_string()),
            },
        }
    }

    /// Record `submission` against the current task and advance by one.
    ///
    /// The counter only moves once the record is persisted, so a failed write
    /// leaves the participant on the same task.
    pub async fn submit(
        &self,
        session: &mut Session,
        submission: &Submission,
    ) -> Result<Screen, FlowError> {
        let total = self.total_tasks();
        if session.task_id >= total {
            return Err(FlowError::Complete(total));
        }

        self.flow
            .record(&session.participant_id, session.task_id, submission)
            .await?;
        session.task_id += 1;
        session.touch();

        tracing::debug!(
            session_id = %session.id,
            "Recorded task {}/{} for participant {}",
            session.task_id,
            total,
            session.participant_id
        );
        if session.task_id >= total {
            tracing::info!(
                session_id = %session.id,
                "Participant {} completed all {} tasks",
                session.participant_id,
                total
            );
        }
        Ok(self.screen(session))
    }
}
