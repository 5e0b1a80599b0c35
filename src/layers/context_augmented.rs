use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{LayerAdapter, LayerError, LayerOutcome, SemanticLayer};
use crate::backends::RetrievalBackend;
use crate::config::LAYER_CONTEXT;
use crate::routing::Task;

/// Semantic scores reranked with retrieved supporting context: prior routing
/// decisions and target capability documents. The blended score is
/// `semantic_weight * semantic + (1 - semantic_weight) * retrieval_evidence`,
/// where a target's evidence is the mean score of the documents that point
/// at it.
pub struct ContextAugmentedLayer {
    semantic: SemanticLayer,
    retrieval: Arc<dyn RetrievalBackend>,
    semantic_weight: f64,
    retrieval_limit: usize,
}

impl ContextAugmentedLayer {
    pub fn new(semantic: SemanticLayer, retrieval: Arc<dyn RetrievalBackend>) -> Self {
        Self {
            semantic,
            retrieval,
            semantic_weight: 0.6,
            retrieval_limit: 5,
        }
    }

    pub fn with_semantic_weight(mut self, weight: f64) -> Self {
        self.semantic_weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit.max(1);
        self
    }
}

#[async_trait]
impl LayerAdapter for ContextAugmentedLayer {
    async fn attempt(&self, task: &Task) -> Result<LayerOutcome, LayerError> {
        let semantic = self.semantic.attempt(task).await?;

        let documents = self
            .retrieval
            .retrieve(&task.description, self.retrieval_limit)
            .await?;

        if semantic.scores.is_empty() && documents.is_empty() {
            return Ok(LayerOutcome::empty("no semantic index and no context"));
        }

        let mut evidence_sums: HashMap<String, (f64, usize)> = HashMap::new();
        for doc in &documents {
            let entry = evidence_sums.entry(doc.target.clone()).or_insert((0.0, 0));
            entry.0 += doc.score.clamp(0.0, 1.0);
            entry.1 += 1;
        }

        // Union of targets seen by either signal, semantic order first so
        // the serialized map stays deterministic.
        let mut targets: Vec<String> = semantic.scores.keys().cloned().collect();
        let mut evidence_targets: Vec<&String> = evidence_sums.keys().collect();
        evidence_targets.sort();
        for target in evidence_targets {
            if !semantic.scores.contains_key(target) {
                targets.push(target.clone());
            }
        }

        let mut scores = IndexMap::new();
        for target in targets {
            let semantic_score = semantic.scores.get(&target).copied().unwrap_or(0.0);
            let evidence = evidence_sums
                .get(&target)
                .map(|(sum, count)| sum / *count as f64)
                .unwrap_or(0.0);
            let blended =
                self.semantic_weight * semantic_score + (1.0 - self.semantic_weight) * evidence;
            scores.insert(target, blended.clamp(0.0, 1.0));
        }

        Ok(LayerOutcome::from_scores(scores)
            .with_metadata("retrieved_documents", Value::from(documents.len()))
            .with_metadata("retrieval_backend", Value::from(self.retrieval.backend_name())))
    }

    fn layer_name(&self) -> &str {
        LAYER_CONTEXT
    }
}
