//! Annotation flows.
//!
//! A flow owns everything needed to show and record one task sequence:
//! - `multi_ruleset`: every revised ruleset against every rubric
//! - `single_rule`: one rule pair at a time against a fixed rubric
//!
//! The [`FormController`] drives a flow for a participant session; flows
//! themselves hold no per-participant state.

mod controller;
mod multi_ruleset;
mod single_rule;

pub use controller::{FormController, Screen, Stage, COMPLETION_MESSAGE};
pub use multi_ruleset::{MultiRulesetFlow, TaskAnnotation};
pub use single_rule::{RuleAnnotation, SingleRuleFlow};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::rubric::{Rubric, RubricError};
use crate::ruleset::RulesetError;
use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Ruleset(#[from] RulesetError),

    #[error(transparent)]
    Rubric(#[from] RubricError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("All {0} tasks have already been annotated")]
    Complete(usize),
}

/// Which flow a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    MultiRuleset,
    SingleRule,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::MultiRuleset => write!(f, "multi_ruleset"),
            FlowKind::SingleRule => write!(f, "single_rule"),
        }
    }
}

impl FromStr for FlowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multi_ruleset" => Ok(FlowKind::MultiRuleset),
            "single_rule" => Ok(FlowKind::SingleRule),
            other => Err(format!(
                "Unknown flow '{}' (expected multi_ruleset or single_rule)",
                other
            )),
        }
    }
}

/// Categorical judgment for a single rule pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    pub const ALL: [Verdict; 3] = [Verdict::Pass, Verdict::Warn, Verdict::Fail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
        }
    }
}

/// Kind of input widget a field needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Choice { choices: Vec<String> },
}

/// A response widget the UI should render for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Key the value is submitted under
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
        }
    }

    pub fn verdict(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Choice {
                choices: Verdict::ALL.iter().map(|v| v.as_str().to_string()).collect(),
            },
        }
    }
}

/// Form values captured on submit. Fields a flow does not render are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub rules_listing: Option<String>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub human_reasoning: Option<String>,
}

/// Everything the UI needs to draw one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: usize,
    pub total_tasks: usize,
    /// Rubric heading and short explanation (markdown)
    pub task: String,
    /// Detailed judging criteria (markdown)
    pub instructions: String,
    pub original_ruleset: String,
    pub revised_ruleset: String,
    /// Set when the pair shown is a meta rule rather than an ordinary rule
    pub meta_rule: bool,
    pub fields: Vec<FieldSpec>,
}

/// A task sequence that can be shown and recorded.
#[async_trait]
pub trait AnnotationFlow: Send + Sync {
    fn kind(&self) -> FlowKind;

    /// Introduction shown before the participant identifies themselves.
    fn intro(&self) -> &str;

    fn total_tasks(&self) -> usize;

    /// View for `task_id`, or `None` once the sequence is exhausted.
    fn task_view(&self, task_id: usize) -> Option<TaskView>;

    /// Persist one submission for `task_id`.
    async fn record(
        &self,
        participant_id: &str,
        task_id: usize,
        submission: &Submission,
    ) -> Result<(), FlowError>;
}

pub(crate) fn task_markdown(rubric: &Rubric) -> String {
    format!("### Task: {}\n\n{}\n", rubric.name, rubric.explanation)
}

pub(crate) fn instructions_markdown(rubric: &Rubric) -> String {
    format!("# Instructions\n\n{}\n", rubric.details)
}
