//! Multi-ruleset / multi-prompt flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{
    instructions_markdown, task_markdown, AnnotationFlow, FieldSpec, FlowError, FlowKind,
    Submission, TaskView,
};
use crate::config::Config;
use crate::rubric::RubricRegistry;
use crate::ruleset::Ruleset;
use crate::sequencer::TaskSequencer;
use crate::sink::AnnotationSink;
use crate::util::now_string;

const INTRO: &str = "## Task Introduction\n\
Our work develops methods for automatically revising rulesets used to train AI to reduce ambiguity. \
We want our new rulesets to be consistent with the intent of the original rulesets and ask humans to \
validate our approach by scoring our rulesets using the same guidelines we provide our models.\n\n\
You will be given an original ruleset, a revised ruleset, and instructions for how to evaluate the \
rulesets side-by-side.";

const RULES_LISTING_LABEL: &str = "Please list the rule numbers of any rules that fit the instruction criteria or type in keywords as the instructions see fit.";
const REASONING_LABEL: &str =
    "Please, if possible, give a short explanation of your reasoning behind your annotation.";

/// One line of the multi-ruleset annotation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnnotation {
    pub prolific_id: String,
    pub task_id: usize,
    pub ruleset_index: usize,
    pub prompt_index: usize,
    pub og_ruleset_filename: String,
    pub revised_ruleset_filename: String,
    pub prompt_key: String,
    pub rules_listing: String,
    pub human_reasoning: String,
    pub submitted_at: String,
}

struct RevisedRuleset {
    /// Path as configured, recorded with each annotation
    filename: String,
    rendered: String,
}

pub struct MultiRulesetFlow {
    sequencer: TaskSequencer,
    rubrics: RubricRegistry,
    original_filename: String,
    original_rendered: String,
    revised: Vec<RevisedRuleset>,
    sink: AnnotationSink,
}

impl MultiRulesetFlow {
    /// Load every ruleset named in `config`. Any unreadable file is fatal.
    pub fn from_config(config: &Config, rubrics: RubricRegistry) -> Result<Self, FlowError> {
        let cfg = &config.multi_ruleset;
        let original = Ruleset::load(config.resolve(&cfg.original))?;
        let revised = cfg
            .revised
            .iter()
            .map(|path| Ruleset::load(config.resolve(path)).map(|rs| (path.clone(), rs)))
            .collect::<Result<Vec<_>, _>>()?;
        let sink = AnnotationSink::new(config.resolve(&cfg.output_path));
        Ok(Self::new(
            (cfg.original.clone(), original),
            revised,
            rubrics,
            sink,
        ))
    }

    /// Build from already-loaded rulesets, each paired with the path to record.
    pub fn new(
        original: (PathBuf, Ruleset),
        revised: Vec<(PathBuf, Ruleset)>,
        rubrics: RubricRegistry,
        sink: AnnotationSink,
    ) -> Self {
        let sequencer = TaskSequencer::new(revised.len(), rubrics.len());
        let revised = revised
            .into_iter()
            .map(|(path, ruleset)| RevisedRuleset {
                filename: path.display().to_string(),
                rendered: format!("### Revised Ruleset:\n\n{}", ruleset.render()),
            })
            .collect();
        Self {
            sequencer,
            rubrics,
            original_filename: original.0.display().to_string(),
            original_rendered: format!("### Original Ruleset:\n\n{}", original.1.render()),
            revised,
            sink,
        }
    }

    pub fn sequencer(&self) -> &TaskSequencer {
        &self.sequencer
    }

    pub fn sink(&self) -> &AnnotationSink {
        &self.sink
    }
}

#[async_trait]
impl AnnotationFlow for MultiRulesetFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::MultiRuleset
    }

    fn intro(&self) -> &str {
        INTRO
    }

    fn total_tasks(&self) -> usize {
        self.sequencer.total()
    }

    fn task_view(&self, task_id: usize) -> Option<TaskView> {
        let indices = self.sequencer.indices(task_id)?;
        let rubric = self.rubrics.by_index(indices.prompt_index)?;
        let revised = self.revised.get(indices.ruleset_index)?;
        Some(TaskView {
            task_id,
            total_tasks: self.total_tasks(),
            task: task_markdown(rubric),
            instructions: instructions_markdown(rubric),
            original_ruleset: self.original_rendered.clone(),
            revised_ruleset: revised.rendered.clone(),
            meta_rule: false,
            fields: vec![
                FieldSpec::text("rules_listing", RULES_LISTING_LABEL),
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
        let total = self.total_tasks();
        let indices = self
            .sequencer
            .indices(task_id)
            .ok_or(FlowError::Complete(total))?;
        let rubric = self
            .rubrics
            .by_index(indices.prompt_index)
            .ok_or(FlowError::Complete(total))?;
        let revised = self
            .revised
            .get(indices.ruleset_index)
            .ok_or(FlowError::Complete(total))?;

        let record = TaskAnnotation {
            prolific_id: participant_id.to_string(),
            task_id,
            ruleset_index: indices.ruleset_index,
            prompt_index: indices.prompt_index,
            og_ruleset_filename: self.original_filename.clone(),
            revised_ruleset_filename: revised.filename.clone(),
            prompt_key: rubric.key.clone(),
            rules_listing: submission.rules_listing.clone().unwrap_or_default(),
            human_reasoning: submission.human_reasoning.clone().unwrap_or_default(),
            submitted_at: now_string(),
        };
        self.sink.append(&record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn flow(dir: &TempDir) -> MultiRulesetFlow {
        write(
            dir,
            "og.jsonl",
            "{\"id\": \"Rule 1\", \"rule\": \"Be kind.\"}\n{\"id\": \"Rule 2\", \"rule\": \"Be brief.\"}\n",
        );
        write(dir, "rev_a.jsonl", "{\"id\": \"Rule 1\", \"rule\": \"Be kind always.\"}\n");
        write(dir, "rev_b.jsonl", "{\"id\": \"Rule 1\", \"rule\": \"Be kind, in 20 words.\"}\n");

        let mut config = Config::new(dir.path().to_path_buf());
        config.multi_ruleset.original = PathBuf::from("og.jsonl");
        config.multi_ruleset.revised = vec![PathBuf::from("rev_a.jsonl"), PathBuf::from("rev_b.jsonl")];
        config.multi_ruleset.output_path = PathBuf::from("out.jsonl");
        MultiRulesetFlow::from_config(&config, RubricRegistry::builtin()).unwrap()
    }

    #[test]
    fn total_is_rulesets_times_rubrics() {
        let dir = TempDir::new().unwrap();
        assert_eq!(flow(&dir).total_tasks(), 2 * 4);
    }

    #[test]
    fn task_view_pairs_ruleset_with_rubric() {
        let dir = TempDir::new().unwrap();
        let flow = flow(&dir);

        let first = flow.task_view(0).unwrap();
        assert!(first.task.starts_with("### Task: Least Restrictive Means"));
        assert!(first.instructions.starts_with("# Instructions\n\n"));
        assert!(first.original_ruleset.starts_with("### Original Ruleset:\n\n"));
        assert!(first.original_ruleset.contains("* Rule 2: Be brief."));
        assert!(first.revised_ruleset.contains("Be kind always."));

        let second = flow.task_view(1).unwrap();
        assert!(second.task.starts_with("### Task: Least Restrictive Means"));
        assert!(second.revised_ruleset.contains("in 20 words"));

        let third = flow.task_view(2).unwrap();
        assert!(third.task.starts_with("### Task: Arbitrary and Capricious"));
        assert!(third.revised_ruleset.contains("Be kind always."));

        assert!(flow.task_view(8).is_none());
    }

    #[test]
    fn missing_revised_file_fails_at_load() {
        let dir = TempDir::new().unwrap();
        write(&dir, "og.jsonl", "{\"id\": \"Rule 1\", \"rule\": \"a\"}\n");
        let mut config = Config::new(dir.path().to_path_buf());
        config.multi_ruleset.original = PathBuf::from("og.jsonl");
        config.multi_ruleset.revised = vec![PathBuf::from("missing.jsonl")];
        let err = MultiRulesetFlow::from_config(&config, RubricRegistry::builtin())
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::Ruleset(_)));
    }

    #[tokio::test]
    async fn record_writes_indices_and_filenames() {
        let dir = TempDir::new().unwrap();
        let flow = flow(&dir);
        let submission = Submission {
            rules_listing: Some("Rule 1".to_string()),
            verdict: None,
            human_reasoning: Some("adds a word limit".to_string()),
        };
        flow.record("P-1", 3, &submission).await.unwrap();

        let records: Vec<TaskAnnotation> = flow.sink().read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.prolific_id, "P-1");
        assert_eq!(rec.task_id, 3);
        assert_eq!(rec.ruleset_index, 1);
        assert_eq!(rec.prompt_index, 1);
        assert_eq!(rec.og_ruleset_filename, "og.jsonl");
        assert_eq!(rec.revised_ruleset_filename, "rev_b.jsonl");
        assert_eq!(rec.prompt_key, "arbitrary_and_capricious");
        assert_eq!(rec.rules_listing, "Rule 1");
        assert_eq!(rec.human_reasoning, "adds a word limit");
    }

    #[tokio::test]
    async fn record_past_the_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let flow = flow(&dir);
        let err = flow
            .record("P-1", 8, &Submission::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Complete(8)));
        assert!(!flow.sink().path().exists());
    }
}
