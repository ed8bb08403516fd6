//! Single-rule flow: one original/revised rule pair per task, one rubric.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{
    instructions_markdown, task_markdown, AnnotationFlow, FieldSpec, FlowError, FlowKind,
    Submission, TaskView, Verdict,
};
use crate::config::Config;
use crate::rubric::{Rubric, RubricRegistry};
use crate::ruleset::{RulePair, Ruleset};
use crate::sequencer::TaskSequencer;
use crate::sink::AnnotationSink;
use crate::util::now_string;

const INTRO: &str = "### Task Introduction\n\
Our work develops methods for automatically revising rulesets used to train AI to reduce ambiguity. \
We want our new rulesets to be consistent with the intent of the original rulesets and ask humans to \
validate our approach by scoring our rulesets using the same guidelines we provide our models.\n\
### Task Steps\n\
For each task, you will be given a prompt and asked to judge whether the revised rule passes it. \
Please provide any open-ended reasoning you have in the text box provided.\n";

const VERDICT_LABEL: &str = "Does the revised rule pass the criteria above?";
const REASONING_LABEL: &str =
    "Please, if possible, give a short explanation of your reasoning behind your annotation.";

/// One line of the single-rule annotation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAnnotation {
    pub prolific_id: String,
    pub task_id: usize,
    pub rule_id: usize,
    /// Index of the revised ruleset; this flow compares a single revision
    pub ruleset_index: usize,
    pub og_ruleset_filename: String,
    pub revised_ruleset_filename: String,
    pub prompt_key: String,
    pub verdict: Option<Verdict>,
    pub human_reasoning: String,
    pub submitted_at: String,
}

pub struct SingleRuleFlow {
    // Rule pairs form the fast axis; there is exactly one prompt.
    sequencer: TaskSequencer,
    first_rule_id: usize,
    rubric: Rubric,
    original: Ruleset,
    revised: Ruleset,
    original_filename: String,
    revised_filename: String,
    sink: AnnotationSink,
}

impl SingleRuleFlow {
    /// Load both rulesets named in `config` and pick the configured rubric.
    pub fn from_config(config: &Config, rubrics: &RubricRegistry) -> Result<Self, FlowError> {
        let cfg = &config.single_rule;
        let rubric = rubrics.require(&cfg.rubric_key)?.clone();
        let original = Ruleset::load(config.resolve(&cfg.original))?;
        let revised = Ruleset::load(config.resolve(&cfg.revised))?;
        let sink = AnnotationSink::new(config.resolve(&cfg.output_path));
        Ok(Self::new(
            (cfg.original.clone(), original),
            (cfg.revised.clone(), revised),
            cfg.first_rule_id,
            cfg.rule_count,
            rubric,
            sink,
        ))
    }

    pub fn new(
        original: (PathBuf, Ruleset),
        revised: (PathBuf, Ruleset),
        first_rule_id: usize,
        rule_count: usize,
        rubric: Rubric,
        sink: AnnotationSink,
    ) -> Self {
        Self {
            sequencer: TaskSequencer::new(rule_count, 1),
            first_rule_id,
            rubric,
            original_filename: original.0.display().to_string(),
            original: original.1,
            revised_filename: revised.0.display().to_string(),
            revised: revised.1,
            sink,
        }
    }

    /// Numeric rule id judged in `task_id`.
    pub fn rule_id(&self, task_id: usize) -> Option<usize> {
        self.sequencer
            .indices(task_id)
            .map(|t| self.first_rule_id + t.ruleset_index)
    }

    pub fn sink(&self) -> &AnnotationSink {
        &self.sink
    }
}

#[async_trait]
impl AnnotationFlow for SingleRuleFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::SingleRule
    }

    fn intro(&self) -> &str {
        INTRO
    }

    fn total_tasks(&self) -> usize {
        self.sequencer.total()
    }

    fn task_view(&self, task_id: usize) -> Option<TaskView> {
        let rule_id = self.rule_id(task_id)?;
        let pair = RulePair::lookup(&self.original, &self.revised, rule_id);
        if !pair.is_complete() {
            tracing::debug!(rule_id, "Rule pair is missing on one side");
        }
        let meta_rule = pair.is_meta();
        if meta_rule {
            tracing::debug!(rule_id, "Rule pair is a meta rule");
        }
        Some(TaskView {
            task_id,
            total_tasks: self.total_tasks(),
            task: task_markdown(&self.rubric),
            instructions: instructions_markdown(&self.rubric),
            original_ruleset: format!("### Original Rule {}:\n\n{}", rule_id, pair.original_text()),
            revised_ruleset: format!("### Revised Rule {}:\n\n{}", rule_id, pair.revised_text()),
            meta_rule,
            fields: vec![
                FieldSpec::verdict("verdict", VERDICT_LABEL),
                FieldSpec::text("human_reasoning", REASONING_LABEL),
            ],
        })
    }

    async fn record(
        &self,
        participant_id: &str,
        task_id: usize,
        submission: &Submission,
    ) -> Result<(), FlowError> {
        let rule_id = self
            .rule_id(task_id)
            .ok_or(FlowError::Complete(self.total_tasks()))?;
        let record = RuleAnnotation {
            prolific_id: participant_id.to_string(),
            task_id,
            rule_id,
            ruleset_index: 0,
            og_ruleset_filename: self.original_filename.clone(),
            revised_ruleset_filename: self.revised_filename.clone(),
            prompt_key: self.rubric.key.clone(),
            verdict: submission.verdict,
            human_reasoning: submission.human_reasoning.clone().unwrap_or_default(),
            submitted_at: now_string(),
        };
        self.sink.append(&record).await?;
        Ok(())
    }
}
