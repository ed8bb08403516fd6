//! Ruleset files: one JSON rule object per line.
//!
//! ```text
//! {"id": "Rule 1", "rule": "Be polite."}
//! {"id": "Meta-Rule 1", "rule": "Rules apply in order."}
//! ```
//!
//! The `id` field joins a rule in the original ruleset to its revised
//! counterpart. Rulesets are read once when a flow is built; a missing or
//! malformed file is a load error, while looking up an id that is not present
//! simply yields nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Substring marking a rule as a meta rule.
pub const META_RULE_MARKER: &str = "Meta-Rule";

#[derive(Debug, Error)]
pub enum RulesetError {
    #[error("Failed to read ruleset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed rule at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A single rule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub rule: String,
}

impl Rule {
    /// Whether the id carries the meta-rule marker.
    pub fn is_meta(&self) -> bool {
        self.id.contains(META_RULE_MARKER)
    }

    /// Render as a markdown list item.
    pub fn render(&self) -> String {
        format!("* {}: {}", self.id, self.rule)
    }
}

/// Rules loaded from one file, in file order.
#[derive(Debug, Clone)]
pub struct Ruleset {
    rules: Vec<Rule>,
}

impl Ruleset {
    /// Load a ruleset from a line-delimited JSON file. Blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesetError> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path).map_err(|source| RulesetError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    fn parse(path: PathBuf, contents: &str) -> Result<Self, RulesetError> {
        let mut rules = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let rule: Rule = serde_json::from_str(line).map_err(|source| RulesetError::Parse {
                path: path.clone(),
                line: idx + 1,
                source,
            })?;
            rules.push(rule);
        }
        tracing::debug!("Loaded {} rules from {}", rules.len(), path.display());
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Render every rule as a list item, separated by blank lines.
    pub fn render(&self) -> String {
        self.rules
            .iter()
            .map(Rule::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// First rule whose id contains the decimal form of `index`.
    ///
    /// This is a substring match, so `1` also matches `Rule 10` when `Rule 1`
    /// is absent or appears later in the file.
    pub fn find_by_index(&self, index: usize) -> Option<&Rule> {
        let needle = index.to_string();
        self.rules.iter().find(|r| r.id.contains(&needle))
    }

    /// Rule text for `index`, or an empty string when no rule matches.
    pub fn rule_text(&self, index: usize) -> &str {
        self.find_by_index(index)
            .map(|r| r.rule.as_str())
            .unwrap_or("")
    }
}

/// The original and revised versions of one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RulePair {
    pub rule_id: usize,
    pub original: Option<Rule>,
    pub revised: Option<Rule>,
}

impl RulePair {
    /// Look up rule `index` in both rulesets. A side missing from its file is
    /// left empty rather than treated as an error.
    pub fn lookup(original: &Ruleset, revised: &Ruleset, index: usize) -> Self {
        Self {
            rule_id: index,
            original: original.find_by_index(index).cloned(),
            revised: revised.find_by_index(index).cloned(),
        }
    }

    /// Whether the rule exists in both rulesets.
    pub fn is_complete(&self) -> bool {
        self.original.is_some() && self.revised.is_some()
    }

    /// Whether either side of the pair is a meta rule.
    pub fn is_meta(&self) -> bool {
        [&self.original, &self.revised]
            .into_iter()
            .flatten()
            .any(Rule::is_meta)
    }

    pub fn original_text(&self) -> &str {
        self.original.as_ref().map(|r| r.rule.as_str()).unwrap_or("")
    }

    pub fn revised_text(&self) -> &str {
        self.revised.as_ref().map(|r| r.rule.as_str()).unwrap_or("")
    }
}
