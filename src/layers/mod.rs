use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::routing::Task;

pub mod classifier;
pub mod context_augmented;
pub mod keyword;
pub mod semantic;

pub use classifier::ClassifierLayer;
pub use context_augmented::ContextAugmentedLayer;
pub use keyword::KeywordLayer;
pub use semantic::{CentroidIndex, SemanticLayer};

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Backend failure: {0}")]
    Backend(#[from] crate::backends::BackendError),

    #[error("Invalid keyword pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Layer failure: {0}")]
    Failed(String),
}

/// Candidate decision produced by one layer: the full score distribution it
/// saw, plus adapter-specific metadata. The orchestrator derives the
/// candidate target from the distribution via [`LayerOutcome::best`].
#[derive(Debug, Clone, Default)]
pub struct LayerOutcome {
    pub scores: IndexMap<String, f64>,
    pub metadata: HashMap<String, Value>,
}

impl LayerOutcome {
    /// The layer saw nothing it can decide on; confidence 0 so the cascade
    /// falls through instead of aborting.
    pub fn empty(reason: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), Value::String(reason.to_string()));
        Self {
            scores: IndexMap::new(),
            metadata,
        }
    }

    pub fn single(target: impl Into<String>, confidence: f64) -> Self {
        let mut scores = IndexMap::new();
        scores.insert(target.into(), confidence);
        Self {
            scores,
            metadata: HashMap::new(),
        }
    }

    pub fn from_scores(scores: IndexMap<String, f64>) -> Self {
        Self {
            scores,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Argmax over the distribution; ties broken by lexicographic order of
    /// target name so routing stays deterministic.
    pub fn best(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (target, score) in &self.scores {
            match best {
                None => best = Some((target.as_str(), *score)),
                Some((best_target, best_score)) => {
                    if *score > best_score
                        || (*score == best_score && target.as_str() < best_target)
                    {
                        best = Some((target.as_str(), *score));
                    }
                }
            }
        }
        best
    }

    pub fn confidence(&self) -> f64 {
        self.best().map(|(_, score)| score).unwrap_or(0.0)
    }
}

#[async_trait]
pub trait LayerAdapter: Send + Sync {
    async fn attempt(&self, task: &Task) -> Result<LayerOutcome, LayerError>;

    fn layer_name(&self) -> &str;
}
