//! Linear task index to (ruleset, prompt) decomposition.
//!
//! Traversal fixes a prompt and iterates over every ruleset before moving on
//! to the next prompt, so the ruleset index varies fastest.

use serde::Serialize;

/// Position of a task in the ruleset × prompt grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskIndices {
    pub ruleset_index: usize,
    pub prompt_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSequencer {
    ruleset_count: usize,
    prompt_count: usize,
}

impl TaskSequencer {
    pub fn new(ruleset_count: usize, prompt_count: usize) -> Self {
        Self {
            ruleset_count,
            prompt_count,
        }
    }

    pub fn ruleset_count(&self) -> usize {
        self.ruleset_count
    }

    pub fn prompt_count(&self) -> usize {
        self.prompt_count
    }

    /// Total number of tasks.
    pub fn total(&self) -> usize {
        self.ruleset_count * self.prompt_count
    }

    /// Whether `task_id` is past the last task.
    pub fn is_terminal(&self, task_id: usize) -> bool {
        task_id >= self.total()
    }

    /// Decompose `task_id`, or `None` once the sequence is exhausted.
    pub fn indices(&self, task_id: usize) -> Option<TaskIndices> {
        if self.is_terminal(task_id) {
            return None;
        }
        Some(TaskIndices {
            ruleset_index: task_id % self.ruleset_count,
            prompt_index: task_id / self.ruleset_count,
        })
    }

    /// Inverse of [`indices`](Self::indices).
    pub fn linear(&self, indices: TaskIndices) -> usize {
        indices.ruleset_index + indices.prompt_index * self.ruleset_count
    }

    pub fn next(&self, task_id: usize) -> usize {
        task_id + 1
    }
}
