//! Configuration management for the annotation server.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `7860`.
//! - `WORKING_DIR` - Optional. Base directory for relative paths. Defaults to current directory.
//! - `ORIGINAL_RULESET` - Optional. Original ruleset for the multi-ruleset flow.
//! - `REVISED_RULESETS` - Optional. Comma-separated revised rulesets for the multi-ruleset flow.
//! - `OUTPUT_PATH` - Optional. Annotation log for the multi-ruleset flow.
//! - `RUBRICS_PATH` - Optional. YAML file replacing the built-in rubrics.
//! - `SINGLE_RULE_ENABLED` - Optional. Serve the single-rule flow. Defaults to `true`.
//! - `SINGLE_RULE_ORIGINAL` / `SINGLE_RULE_REVISED` - Optional. Rulesets for the single-rule flow.
//! - `SINGLE_RULE_COUNT` - Optional. Number of rule pairs to annotate. Defaults to `3`.
//! - `SINGLE_RULE_FIRST_ID` - Optional. Numeric id of the first rule pair. Defaults to `1`.
//! - `SINGLE_RULE_RUBRIC` - Optional. Rubric key used by the single-rule flow.
//! - `SINGLE_RULE_OUTPUT_PATH` - Optional. Annotation log for the single-rule flow.
//! - `SESSION_TTL_SECS` - Optional. Idle time before a session is forgotten, between 1 and
//!   `MAX_SESSION_TTL_SECS`. Defaults to `86400`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::util::{env_var_bool, resolve_path, split_list};

/// Upper bound for `SESSION_TTL_SECS` (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Multi-ruleset / multi-prompt flow configuration.
#[derive(Debug, Clone)]
pub struct MultiRulesetConfig {
    /// Original ruleset every revision is compared against
    pub original: PathBuf,

    /// Revised rulesets, in annotation order
    pub revised: Vec<PathBuf>,

    /// Annotation log
    pub output_path: PathBuf,
}

impl Default for MultiRulesetConfig {
    fn default() -> Self {
        Self {
            original: PathBuf::from("rulesets/prompt1.jsonl"),
            revised: vec![
                PathBuf::from("rulesets/prompt2.jsonl"),
                PathBuf::from("rulesets/prompt3.jsonl"),
                PathBuf::from("rulesets/prompt4.jsonl"),
            ],
            output_path: PathBuf::from("output_annotations.jsonl"),
        }
    }
}

/// Single-rule flow configuration.
#[derive(Debug, Clone)]
pub struct SingleRuleConfig {
    /// Whether the flow is served at all
    pub enabled: bool,

    pub original: PathBuf,

    pub revised: PathBuf,

    /// Number of rule pairs to step through
    pub rule_count: usize,

    /// Numeric id of the first rule pair
    pub first_rule_id: usize,

    /// Rubric key shown for every pair
    pub rubric_key: String,

    /// Annotation log
    pub output_path: PathBuf,
}

impl Default for SingleRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            original: PathBuf::from("rulesets/original_rules.jsonl"),
            revised: PathBuf::from("rulesets/revised_rules.jsonl"),
            rule_count: 3,
            first_rule_id: 1,
            rubric_key: "least_restrictive_means".to_string(),
            output_path: PathBuf::from("output_single_rule_annotations.jsonl"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Base directory for every relative path below
    pub working_dir: PathBuf,

    /// Optional YAML rubric file (built-in rubrics when unset)
    pub rubrics_path: Option<PathBuf>,

    /// Idle session lifetime in seconds
    pub session_ttl_secs: u64,

    pub multi_ruleset: MultiRulesetConfig,

    pub single_rule: SingleRuleConfig,
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn validate_session_ttl(secs: u64) -> Result<u64, ConfigError> {
    if secs == 0 || secs > MAX_SESSION_TTL_SECS {
        return Err(ConfigError::InvalidValue(
            "SESSION_TTL_SECS".to_string(),
            format!("{} is outside 1..={}", secs, MAX_SESSION_TTL_SECS),
        ));
    }
    Ok(secs)
}

fn path_env(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse,
    /// `SESSION_TTL_SECS` is out of range or `REVISED_RULESETS` names no file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 7860u16)?;

        let working_dir = std::env::var("WORKING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let rubrics_path = std::env::var("RUBRICS_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let session_ttl_secs = validate_session_ttl(parse_env("SESSION_TTL_SECS", 86_400u64)?)?;

        let defaults = MultiRulesetConfig::default();
        let revised = match std::env::var("REVISED_RULESETS") {
            Ok(raw) => {
                let files: Vec<PathBuf> = split_list(&raw).into_iter().map(PathBuf::from).collect();
                if files.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "REVISED_RULESETS".to_string(),
                        "no ruleset files listed".to_string(),
                    ));
                }
                files
            }
            Err(_) => defaults.revised,
        };
        let multi_ruleset = MultiRulesetConfig {
            original: path_env("ORIGINAL_RULESET", defaults.original),
            revised,
            output_path: path_env("OUTPUT_PATH", defaults.output_path),
        };

        let defaults = SingleRuleConfig::default();
        let single_rule = SingleRuleConfig {
            enabled: env_var_bool("SINGLE_RULE_ENABLED", defaults.enabled),
            original: path_env("SINGLE_RULE_ORIGINAL", defaults.original),
            revised: path_env("SINGLE_RULE_REVISED", defaults.revised),
            rule_count: parse_env("SINGLE_RULE_COUNT", defaults.rule_count)?,
            first_rule_id: parse_env("SINGLE_RULE_FIRST_ID", defaults.first_rule_id)?,
            rubric_key: std::env::var("SINGLE_RULE_RUBRIC").unwrap_or(defaults.rubric_key),
            output_path: path_env("SINGLE_RULE_OUTPUT_PATH", defaults.output_path),
        };

        Ok(Self {
            host,
            port,
            working_dir,
            rubrics_path,
            session_ttl_secs,
            multi_ruleset,
            single_rule,
        })
    }

    /// Create a config with default values rooted at `working_dir` (useful for testing).
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            working_dir,
            rubrics_path: None,
            session_ttl_secs: 86_400,
            multi_ruleset: MultiRulesetConfig::default(),
            single_rule: SingleRuleConfig::default(),
        }
    }

    /// Idle session lifetime as a duration.
    pub fn session_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        let secs = validate_session_ttl(self.session_ttl_secs)?;
        i64::try_from(secs)
            .map(chrono::Duration::seconds)
            .map_err(|e| ConfigError::InvalidValue("SESSION_TTL_SECS".to_string(), e.to_string()))
    }

    /// Resolve a configured path against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.working_dir, path)
    }
}
