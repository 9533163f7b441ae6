//! Task - the input unit for one end-to-end run

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default outer-iteration cap
pub const DEFAULT_MAX_OUTER: u32 = 5;

/// Default inner-iteration cap
pub const DEFAULT_MAX_INNER: u32 = 10;

/// One end-to-end unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Free-text task description
    pub description: String,

    /// Workspace directory for contracts, source, and audit reports
    pub workspace: PathBuf,

    /// Outer (refinement) iteration cap
    pub max_outer: u32,

    /// Inner (implementation) iteration cap
    pub max_inner: u32,
}

impl Task {
    /// Create a task with default iteration caps
    pub fn new(description: impl Into<String>, workspace: PathBuf) -> Self {
        Self {
            description: description.into(),
            workspace,
            max_outer: DEFAULT_MAX_OUTER,
            max_inner: DEFAULT_MAX_INNER,
        }
    }

    pub fn with_caps(mut self, max_outer: u32, max_inner: u32) -> Self {
        self.max_outer = max_outer;
        self.max_inner = max_inner;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults() {
        let task = Task::new("add a hello function", PathBuf::from("/tmp/ws"));
        assert_eq!(task.max_outer, 5);
        assert_eq!(task.max_inner, 10);
    }

    #[test]
    fn test_task_with_caps() {
        let task = Task::new("x", PathBuf::from("/tmp/ws")).with_caps(2, 3);
        assert_eq!(task.max_outer, 2);
        assert_eq!(task.max_inner, 3);
    }
}
