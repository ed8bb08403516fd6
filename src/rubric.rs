//! Rubric registry.
//!
//! A rubric is the judging prompt shown to participants: a display name, a
//! short explanation and the detailed criteria. The registry is built once at
//! startup, either from the built-in table or from a YAML file, and is never
//! mutated afterwards.
//!
//! YAML format:
//!
//! ```yaml
//! - key: least_restrictive_means
//!   name: Least Restrictive Means
//!   explanation: ...
//!   details: |
//!     ...
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RubricError {
    #[error("Failed to read rubric file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rubric file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Duplicate rubric key: {0}")]
    DuplicateKey(String),

    #[error("Rubric registry is empty")]
    Empty,

    #[error("Unknown rubric: {0}")]
    UnknownKey(String),
}

/// A judging rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    /// Stable identifier recorded with every annotation
    pub key: String,
    pub name: String,
    pub explanation: String,
    pub details: String,
}

/// Immutable, ordered rubric table.
#[derive(Debug, Clone)]
pub struct RubricRegistry {
    rubrics: Vec<Rubric>,
    by_key: HashMap<String, usize>,
}

impl RubricRegistry {
    /// Build a registry, rejecting empty tables and duplicate keys.
    pub fn new(rubrics: Vec<Rubric>) -> Result<Self, RubricError> {
        if rubrics.is_empty() {
            return Err(RubricError::Empty);
        }
        let mut by_key = HashMap::with_capacity(rubrics.len());
        for (idx, rubric) in rubrics.iter().enumerate() {
            if by_key.insert(rubric.key.clone(), idx).is_some() {
                return Err(RubricError::DuplicateKey(rubric.key.clone()));
            }
        }
        Ok(Self { rubrics, by_key })
    }

    /// The built-in rubrics.
    pub fn builtin() -> Self {
        let rubrics = BUILTIN_RUBRICS
            .iter()
            .map(|(key, name, explanation, details)| Rubric {
                key: key.to_string(),
                name: name.to_string(),
                explanation: explanation.to_string(),
                details: details.to_string(),
            })
            .collect();
        Self::new(rubrics).expect("built-in rubric keys are unique")
    }

    /// Load rubrics from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RubricError> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path).map_err(|source| RubricError::Io {
            path: path.clone(),
            source,
        })?;
        let rubrics: Vec<Rubric> = serde_yaml::from_str(&contents)
            .map_err(|source| RubricError::Parse { path: path.clone(), source })?;
        tracing::info!("Loaded {} rubrics from {}", rubrics.len(), path.display());
        Self::new(rubrics)
    }

    /// Load from `path` when given, otherwise use the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, RubricError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Rubric> {
        self.by_key.get(key).map(|&idx| &self.rubrics[idx])
    }

    /// Look up a rubric, failing with `UnknownKey` if absent.
    pub fn require(&self, key: &str) -> Result<&Rubric, RubricError> {
        self.get(key)
            .ok_or_else(|| RubricError::UnknownKey(key.to_string()))
    }

    pub fn by_index(&self, index: usize) -> Option<&Rubric> {
        self.rubrics.get(index)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rubrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rubrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rubric> {
        self.rubrics.iter()
    }

    /// Registry restricted to one rubric.
    pub fn only(&self, key: &str) -> Result<Self, RubricError> {
        Self::new(vec![self.require(key)?.clone()])
    }
}

// (key, name, explanation, details)
const BUILTIN_RUBRICS: &[(&str, &str, &str, &str)] = &[
    (
        "least_restrictive_means",
        "Least Restrictive Means",
        "We want rulesets that reduce ambiguity by being more specific, but we don't want rules to become overly restrictive by adding hard-coded numbers, exact response phrases, or fixed requirements.",
        r#"Skip any rules where the "id" field contains "Meta-Rule"
If a rule exists in one ruleset but not the other, skip it.
Compare each rule in the Revised Ruleset to its corresponding rule in the Original Ruleset (match them by the "id" field).
For each revised rule, determine if it has become OVERLY RESTRICTIVE.

Respond with a list of each revised rule that is OVERLY RESTRICTIVE along with feedback on *why* you marked it as overly restrictive.

# Definition of OVERLY RESTRICTIVE
A revised rule is OVERLY RESTRICTIVE if it adds hard-coded requirements not obviously required by the original rule like:
- Exact phrases or wording that must be used (e.g. "start your response with 'that sounds great!'")
- Specific numbers or limits (e.g. "use no more than 20 words")
- Required counts or thresholds (e.g. "refuse to answer 50% of the time")
"#,
    ),
    (
        "arbitrary_and_capricious",
        "Arbitrary and Capricious",
        "This prompt identifies arbitrary and capricious revisions including: \n 1. Adding entirely new rules not present in the original \n 2. Deleting existing rules from the original",
        r#"Skip any rules where the "id" field contains "Meta-Rule".
Identify two types of problematic changes:
1. NEW_RULE: A rule appears in the Revised Ruleset but not in the Original Ruleset (based on the "id" field)
2. DELETED_RULE: A rule appears in the Original Ruleset but not in the Revised Ruleset (based on the "id" field)
"#,
    ),
    (
        "absurdity_check",
        "Absurdity Check",
        "This prompt applies an absurdity doctrine to catch rules that are:\n1. Self-contradictory within the revised rule itself\n2. Contradictory when read together with the corresponding original rule",
        r#"Skip any rules where the "id" field contains "Meta-Rule".
If a rule exists in one ruleset but not the other, skip it.
Compare each rule in the Revised Ruleset to its corresponding rule in the Original Ruleset (match them by the "id" field).

For each revised rule, determine whether or not it is ABSURD according to the given definition.
Respond with a list of each revised rule that is ABSURD along with your reasoning for why you marked it as absurd.

# Definition of ABSURD
A revised rule is ABSURD if either of the following conditions are true:
1. A literal reading of the revised rule would give a clearly absurd or self-contradictory result
2. An attempt to fulfill the requirements of the revised rule together with the original rule would give a clearly absurd or self-contradictory result
"#,
    ),
    (
        "logical_outgrowth_doctrine",
        "Logical Outgrowth Doctrine",
        "Overall ruleset structures should not shift between ruleset iterations based on logical outgrowth doctrine. While we allow rule linkages, or rules that refer to other rules in their text body, a rule linkage should not preclude the application of a separate rule. Similarly, while we allow meta-rules, we want to make sure meta-rules are consistent with the ruleset that they describe.",
        r#"A META_RULE is a rule where the "id" field of the rule contains the string "Meta-Rule"
Skip any rules where the "id" field contains "Meta-Rule".
If a rule exists in one ruleset but not the other, skip it.
Compare each rule in the Revised Ruleset to its corresponding rule in the Original Ruleset (match them by the "id" field).
For each revised rule, if it is not a META_RULE, determine whether it creates a RESTRICTIVE_LINKAGE to another rule.
For each revised rule, if it is not a META_RULE, determine whether it is INCONSISTENT_WITH_META with any meta-rule rule.

Respond with a list of each revised rule that has either a RESTRICTIVE_LINKAGE or is INCONSISTENT_WITH_META along with feedback on *why* you marked it as being such and the rule that's linked or the meta-rule that it's being inconsistent with.

# Definition of RESTRICTIVE_LINKAGE
A revised rule has a RESTRICTIVE_LINKAGE if it precludes the application of a separate rule, or if it states that another rule precludes its application.

# Definition of INCONSISTENT_WITH_META
A revised rule is INCONSISTENT_WITH_META if a literal reading of the revised rule is inconsistent with any meta-rule (a revised rule will often be orthogonal to a meta-rule, in which case you should not raise this flag)
"#,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_registry_preserves_order() {
        let registry = RubricRegistry::builtin();
        let keys: Vec<&str> = registry.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "least_restrictive_means",
                "arbitrary_and_capricious",
                "absurdity_check",
                "logical_outgrowth_doctrine",
            ]
        );
        assert_eq!(registry.position("absurdity_check"), Some(2));
        assert_eq!(
            registry.by_index(0).map(|r| r.name.as_str()),
            Some("Least Restrictive Means")
        );
        assert!(registry.by_index(4).is_none());
    }

    #[test]
    fn unknown_key_is_reported() {
        let registry = RubricRegistry::builtin();
        assert!(registry.get("nope").is_none());
        assert!(matches!(
            registry.require("nope"),
            Err(RubricError::UnknownKey(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let rubric = Rubric {
            key: "a".to_string(),
            name: "A".to_string(),
            explanation: String::new(),
            details: String::new(),
        };
        let err = RubricRegistry::new(vec![rubric.clone(), rubric]).unwrap_err();
        assert!(matches!(err, RubricError::DuplicateKey(k) if k == "a"));
        assert!(matches!(
            RubricRegistry::new(Vec::new()),
            Err(RubricError::Empty)
        ));
    }

    #[test]
    fn only_narrows_to_one_rubric() {
        let registry = RubricRegistry::builtin().only("absurdity_check").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.position("absurdity_check"), Some(0));
    }

    #[test]
    fn loads_rubrics_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rubrics.yaml");
        std::fs::write(
            &path,
            "- key: clarity\n  name: Clarity\n  explanation: Is it clear?\n  details: |\n    Flag vague rules.\n",
        )
        .unwrap();

        let registry = RubricRegistry::load(Some(&path)).unwrap();
        assert_eq!(registry.len(), 1);
        let rubric = registry.get("clarity").unwrap();
        assert_eq!(rubric.name, "Clarity");
        assert_eq!(rubric.details, "Flag vague rules.\n");
    }

    #[test]
    fn malformed_yaml_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rubrics.yaml");
        std::fs::write(&path, "- key: [unclosed\n").unwrap();
        assert!(matches!(
            RubricRegistry::from_yaml_file(&path),
            Err(RubricError::Parse { .. })
        ));
    }
}
