use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use super::{LayerAdapter, LayerError, LayerOutcome};
use crate::backends::{EmbeddingBackend, cosine_similarity};
use crate::config::LAYER_SEMANTIC;
use crate::registry::TargetRegistry;
use crate::routing::Task;

/// Precomputed per-target embedding centroids. Insertion order is kept so
/// score maps serialize deterministically.
pub struct CentroidIndex {
    centroids: RwLock<IndexMap<String, Vec<f32>>>,
}

impl CentroidIndex {
    pub fn new() -> Self {
        Self {
            centroids: RwLock::new(IndexMap::new()),
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, IndexMap<String, Vec<f32>>> {
        match self.centroids.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, target: &str, centroid: Vec<f32>) {
        let mut centroids = match self.centroids.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        centroids.insert(target.to_string(), centroid);
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    fn entries(&self) -> Vec<(String, Vec<f32>)> {
        self.read_lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for CentroidIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedding-similarity layer: the task description is embedded and compared
/// against each target centroid; confidence is cosine similarity normalized
/// into [0, 1].
pub struct SemanticLayer {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<CentroidIndex>,
}

impl SemanticLayer {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, index: Arc<CentroidIndex>) -> Self {
        Self { embedder, index }
    }

    /// Cold-start bootstrap: seed each registered target's centroid from its
    /// static description, so new targets are routable before any history
    /// exists.
    pub async fn bootstrap(
        embedder: Arc<dyn EmbeddingBackend>,
        registry: &TargetRegistry,
    ) -> Result<Self, LayerError> {
        let index = Arc::new(CentroidIndex::new());
        for (target, description) in registry.descriptions() {
            let centroid = embedder.embed(&description).await?;
            index.insert(&target, centroid);
        }
        Ok(Self::new(embedder, index))
    }

    pub fn index(&self) -> Arc<CentroidIndex> {
        Arc::clone(&self.index)
    }

    fn normalize(similarity: f64) -> f64 {
        ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl LayerAdapter for SemanticLayer {
    async fn attempt(&self, task: &Task) -> Result<LayerOutcome, LayerError> {
        if self.index.is_empty() {
            return Ok(LayerOutcome::empty("semantic index is empty"));
        }

        let query = self.embedder.embed(&task.description).await?;

        let mut scores = IndexMap::new();
        for (target, centroid) in self.index.entries() {
            let similarity = cosine_similarity(&query, &centroid);
            scores.insert(target, Self::normalize(similarity));
        }

        Ok(LayerOutcome::from_scores(scores)
            .with_metadata("embedding_backend", Value::from(self.embedder.backend_name())))
    }

    fn layer_name(&self) -> &str {
        LAYER_SEMANTIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockEmbeddingBackend;

    async fn bootstrapped_layer() -> SemanticLayer {
        let registry = TargetRegistry::new(1);
        registry.register(
            "development-master",
            "implements features and fixes bugs in application code",
        );
        registry.register(
            "devops-master",
            "deploys services and manages production infrastructure",
        );
        SemanticLayer::bootstrap(Arc::new(MockEmbeddingBackend::new()), &registry)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty_outcome() {
        let layer = SemanticLayer::new(
            Arc::new(MockEmbeddingBackend::new()),
            Arc::new(CentroidIndex::new()),
        );
        let outcome = layer.attempt(&Task::new("fix the bug")).await.unwrap();
        assert_eq!(outcome.confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_scores_every_indexed_target() {
        let layer = bootstrapped_layer().await;
        let outcome = layer
            .attempt(&Task::new("deploy the payment service"))
            .await
            .unwrap();
        assert_eq!(outcome.scores.len(), 2);
        for score in outcome.scores.values() {
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[tokio::test]
    async fn test_description_echo_scores_highest() {
        let layer = bootstrapped_layer().await;
        let outcome = layer
            .attempt(&Task::new(
                "deploys services and manages production infrastructure",
            ))
            .await
            .unwrap();
        let (best, confidence) = outcome.best().map(|(t, c)| (t.to_string(), c)).unwrap();
        assert_eq!(best, "devops-master");
        assert!(confidence > 0.95);
    }

    #[tokio::test]
    async fn test_newly_inserted_centroid_becomes_routable() {
        let layer = bootstrapped_layer().await;
        let embedder = Arc::new(MockEmbeddingBackend::new());
        let centroid = embedder
            .embed("writes quarterly financial summaries")
            .await
            .unwrap();
        layer.index().insert("finance-master", centroid);

        let outcome = layer
            .attempt(&Task::new("writes quarterly financial summaries"))
            .await
            .unwrap();
        assert_eq!(outcome.best().unwrap().0, "finance-master");
    }
}
