use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use super::{LayerAdapter, LayerError, LayerOutcome};
use crate::backends::ClassifierBackend;
use crate::config::LAYER_CLASSIFIER;
use crate::registry::TargetRegistry;
use crate::routing::Task;

/// Trained-classifier layer. Confidence is the softmax probability of the
/// argmax class. Targets still in cold start (below the registry's sample
/// floor) are excluded from the distribution until promoted.
pub struct ClassifierLayer {
    backend: Arc<dyn ClassifierBackend>,
    registry: Arc<TargetRegistry>,
}

impl ClassifierLayer {
    pub fn new(backend: Arc<dyn ClassifierBackend>, registry: Arc<TargetRegistry>) -> Self {
        Self { backend, registry }
    }
}

#[async_trait]
impl LayerAdapter for ClassifierLayer {
    async fn attempt(&self, task: &Task) -> Result<LayerOutcome, LayerError> {
        let promoted = self.registry.promoted_targets();
        if promoted.is_empty() {
            return Ok(LayerOutcome::empty("no targets promoted for classifier"));
        }

        let predictions = self.backend.classify(&task.description).await?;
        if predictions.is_empty() {
            return Ok(LayerOutcome::empty("classifier returned no predictions"));
        }

        let mut excluded = 0usize;
        let mut scores = IndexMap::new();
        for prediction in predictions {
            if promoted.iter().any(|t| t == &prediction.target) {
                scores.insert(prediction.target, prediction.probability.clamp(0.0, 1.0));
            } else {
                excluded += 1;
            }
        }

        if scores.is_empty() {
            return Ok(LayerOutcome::empty(
                "all predicted targets are still in cold start",
            ));
        }

        Ok(LayerOutcome::from_scores(scores)
            .with_metadata("model", Value::from(self.backend.backend_name()))
            .with_metadata("excluded_cold_targets", Value::from(excluded)))
    }

    fn layer_name(&self) -> &str {
        LAYER_CLASSIFIER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockClassifierBackend;

    fn registry_with_samples(samples: &[(&str, u64)], floor: u64) -> Arc<TargetRegistry> {
        let registry = TargetRegistry::new(floor);
        for (name, count) in samples {
            registry.register(name, "test target");
            for _ in 0..*count {
                registry.record_sample(name);
            }
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_no_promoted_targets_returns_empty_outcome() {
        let registry = registry_with_samples(&[("development-master", 0)], 5);
        let backend = Arc::new(MockClassifierBackend::new(vec![
            "development-master".to_string(),
        ]));
        let layer = ClassifierLayer::new(backend, registry);

        let outcome = layer.attempt(&Task::new("fix bug")).await.unwrap();
        assert_eq!(outcome.confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_cold_targets_are_excluded_from_distribution() {
        let registry = registry_with_samples(&[("warm-master", 10), ("cold-master", 1)], 5);
        let backend = Arc::new(
            MockClassifierBackend::new(vec![
                "warm-master".to_string(),
                "cold-master".to_string(),
            ])
            .with_rule("deploy", vec![("cold-master", 0.8), ("warm-master", 0.2)]),
        );
        let layer = ClassifierLayer::new(backend, registry);

        let outcome = layer.attempt(&Task::new("deploy it")).await.unwrap();
        assert!(!outcome.scores.contains_key("cold-master"));
        assert_eq!(outcome.best().unwrap().0, "warm-master");
        assert_eq!(
            outcome.metadata.get("excluded_cold_targets"),
            Some(&Value::from(1))
        );
    }

    #[tokio::test]
    async fn test_promoted_target_wins_with_softmax_probability() {
        let registry = registry_with_samples(&[("warm-master", 10), ("other-master", 10)], 5);
        let backend = Arc::new(
            MockClassifierBackend::new(vec![
                "warm-master".to_string(),
                "other-master".to_string(),
            ])
            .with_rule("migrate", vec![("warm-master", 0.75), ("other-master", 0.25)]),
        );
        let layer = ClassifierLayer::new(backend, registry);

        let outcome = layer.attempt(&Task::new("migrate the database")).await.unwrap();
        assert_eq!(outcome.best(), Some(("warm-master", 0.75)));
    }
}
