use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::RouterConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetProfile {
    pub name: String,
    pub description: String,
    /// Confirmed routed tasks observed for this target.
    pub sample_count: u64,
    pub registered_at: DateTime<Utc>,
}

/// Known routing targets and their cold-start state.
///
/// A freshly registered target is routable by the semantic layer right away
/// (its static description seeds the centroid index), but stays out of the
/// learned-classifier layer until enough confirmed samples accumulate.
pub struct TargetRegistry {
    min_classifier_samples: u64,
    targets: RwLock<IndexMap<String, TargetProfile>>,
}

impl TargetRegistry {
    pub fn new(min_classifier_samples: u64) -> Self {
        Self {
            min_classifier_samples,
            targets: RwLock::new(IndexMap::new()),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        let registry = Self::new(config.cold_start.min_classifier_samples);
        for (name, spec) in &config.targets {
            registry.register(name, &spec.description);
        }
        registry
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, IndexMap<String, TargetProfile>> {
        match self.targets.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, IndexMap<String, TargetProfile>> {
        match self.targets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self, name: &str, description: &str) {
        let mut targets = self.write_lock();
        targets
            .entry(name.to_string())
            .or_insert_with(|| TargetProfile {
                name: name.to_string(),
                description: description.to_string(),
                sample_count: 0,
                registered_at: Utc::now(),
            });
    }

    pub fn record_sample(&self, name: &str) {
        let mut targets = self.write_lock();
        if let Some(profile) = targets.get_mut(name) {
            profile.sample_count += 1;
        }
    }

    pub fn is_promoted(&self, name: &str) -> bool {
        self.read_lock()
            .get(name)
            .is_some_and(|p| p.sample_count >= self.min_classifier_samples)
    }

    /// Targets the learned-classifier layer is allowed to score.
    pub fn promoted_targets(&self) -> Vec<String> {
        self.read_lock()
            .values()
            .filter(|p| p.sample_count >= self.min_classifier_samples)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.read_lock()
            .values()
            .map(|p| (p.name.clone(), p.description.clone()))
            .collect()
    }

    pub fn profiles(&self) -> Vec<TargetProfile> {
        self.read_lock().values().cloned().collect()
    }

    /// Rebuild sample counts from the routing event log, counting each
    /// outcome whose true target is known. Used at startup so promotion
    /// state survives process restarts.
    pub fn absorb_history(&self, events: &[crate::telemetry::RoutingEvent]) {
        for event in events {
            let Some(outcome) = &event.outcome else {
                continue;
            };
            let routed = event
                .final_decision
                .as_ref()
                .and_then(|d| d.selected_target.as_deref());
            if let Some(target) = outcome.true_target(routed) {
                self.record_sample(&target);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = TargetRegistry::new(5);
        registry.register("development-master", "builds things");
        registry.record_sample("development-master");
        registry.register("development-master", "a different description");

        let profiles = registry.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].sample_count, 1);
        assert_eq!(profiles[0].description, "builds things");
    }

    #[test]
    fn test_promotion_requires_min_samples() {
        let registry = TargetRegistry::new(3);
        registry.register("devops-master", "deploys things");

        assert!(!registry.is_promoted("devops-master"));
        registry.record_sample("devops-master");
        registry.record_sample("devops-master");
        assert!(!registry.is_promoted("devops-master"));
        registry.record_sample("devops-master");
        assert!(registry.is_promoted("devops-master"));
    }

    #[test]
    fn test_promoted_targets_filters_cold_targets() {
        let registry = TargetRegistry::new(1);
        registry.register("warm", "has history");
        registry.register("cold", "brand new");
        registry.record_sample("warm");

        assert_eq!(registry.promoted_targets(), vec!["warm".to_string()]);
    }

    #[test]
    fn test_absorb_history_counts_resolved_outcomes() {
        use crate::telemetry::{FinalDecision, Outcome, OutcomeStatus, RoutingEvent};
        use indexmap::IndexMap;

        let registry = TargetRegistry::new(2);
        registry.register("development-master", "builds things");

        let mut event = RoutingEvent::started(
            "evt-1".to_string(),
            "task-1".to_string(),
            "fix bug".to_string(),
            Utc::now(),
        );
        event.final_decision = Some(FinalDecision::routed(
            "development-master".to_string(),
            "semantic".to_string(),
            0.9,
            IndexMap::new(),
        ));
        event.outcome = Some(Outcome {
            task_completed: true,
            status: OutcomeStatus::Completed,
            was_correct_target: Some(true),
            corrected_to: None,
            completion_time_minutes: None,
            quality_score: None,
        });

        registry.absorb_history(&[event.clone(), event]);
        assert!(registry.is_promoted("development-master"));
    }

    #[test]
    fn test_record_sample_for_unknown_target_is_ignored() {
        let registry = TargetRegistry::new(1);
        registry.record_sample("ghost");
        assert!(registry.is_empty());
    }
}
