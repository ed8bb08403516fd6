//! # Rule Annotator
//!
//! Web service that collects human judgments comparing an original ruleset
//! with revised rulesets produced by an automatic revision process.
//!
//! This library provides:
//! - Ruleset loading from line-delimited JSON files
//! - A fixed rubric registry describing how to judge each revision
//! - Two annotation flows driven per participant session
//! - An append-only JSON-lines annotation log
//! - An HTTP API exposing each form screen as a JSON view model
//!
//! ## Task Flow
//! 1. Participant enters their id and a session starts at task zero
//! 2. Each screen shows a rubric plus the original and revised rules
//! 3. Submit appends one record to the log and advances by one task
//! 4. After the last task the form is replaced by a completion message
//!
//! ## Modules
//! - `ruleset`: Rule records and ruleset files
//! - `rubric`: Judging rubrics
//! - `sequencer`: Linear task index decomposition
//! - `sink`: Annotation log
//! - `session`: Per-participant task counters
//! - `flow`: Multi-ruleset and single-rule flows plus the form controller
//! - `api`: HTTP endpoints

pub mod api;
pub mod config;
pub mod flow;
pub mod rubric;
pub mod ruleset;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod util;

pub use config::Config;
pub use flow::{FlowKind, FormController, Screen, Stage, Submission};
pub use rubric::{Rubric, RubricRegistry};
pub use ruleset::{Rule, Ruleset};
