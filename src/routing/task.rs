use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A unit of work to be routed. Immutable once submitted; the cascade only
/// ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            task_id: format!("task-{}", Uuid::new_v4()),
            description: description.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_task_ids_are_unique() {
        let a = Task::new("first");
        let b = Task::new("second");
        assert_ne!(a.task_id, b.task_id);
        assert!(a.task_id.starts_with("task-"));
    }

    #[test]
    fn test_builder_overrides() {
        let task = Task::new("deploy the api")
            .with_id("task-42")
            .with_metadata("priority", "high");
        assert_eq!(task.task_id, "task-42");
        assert_eq!(task.metadata.get("priority"), Some(&"high".to_string()));
    }
}
