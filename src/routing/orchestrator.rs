use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::timeout;

use super::decision::RoutingDecision;
use super::errors::{RoutingError, RoutingResult};
use super::task::Task;
use crate::config::{ConfigStore, LayerSpec};
use crate::layers::LayerAdapter;
use crate::telemetry::{FinalDecision, LayerAttempt, PerformanceTracker};

/// Drives the ordered layer cascade for one task at a time. Stateless across
/// runs: each `route()` call snapshots the layer specs, walks the adapters in
/// `layer_id` order and stops at the first confident layer, falling through
/// to the clarification terminal when none qualifies.
pub struct CascadeOrchestrator {
    config: Arc<ConfigStore>,
    tracker: Arc<PerformanceTracker>,
    adapters: HashMap<String, Arc<dyn LayerAdapter>>,
}

pub struct CascadeBuilder {
    config: Arc<ConfigStore>,
    tracker: Arc<PerformanceTracker>,
    adapters: HashMap<String, Arc<dyn LayerAdapter>>,
}

impl CascadeBuilder {
    pub fn with_adapter(mut self, adapter: Arc<dyn LayerAdapter>) -> Self {
        self.adapters.insert(adapter.layer_name().to_string(), adapter);
        self
    }

    /// Fails fast when a configured layer has no adapter behind it.
    pub fn build(self) -> RoutingResult<CascadeOrchestrator> {
        let config = self.config.snapshot();
        for layer in &config.layers {
            if !self.adapters.contains_key(&layer.name) {
                return Err(RoutingError::AdapterMissing {
                    layer: layer.name.clone(),
                });
            }
        }
        Ok(CascadeOrchestrator {
            config: self.config,
            tracker: self.tracker,
            adapters: self.adapters,
        })
    }
}

enum AttemptResult {
    Completed(LayerAttempt, Option<(String, f64)>),
    Cancelled,
}

impl CascadeOrchestrator {
    pub fn builder(config: Arc<ConfigStore>, tracker: Arc<PerformanceTracker>) -> CascadeBuilder {
        CascadeBuilder {
            config,
            tracker,
            adapters: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        Arc::clone(&self.tracker)
    }

    pub async fn route(&self, task: Task) -> RoutingResult<RoutingDecision> {
        self.route_inner(task, None).await
    }

    /// Like [`route`](Self::route), but stops invoking further layers once
    /// the receiver observes `true`. The RoutingEvent is still finalized with
    /// whatever attempts were recorded, marked as a cancelled decision.
    pub async fn route_with_cancellation(
        &self,
        task: Task,
        cancel: watch::Receiver<bool>,
    ) -> RoutingResult<RoutingDecision> {
        self.route_inner(task, Some(cancel)).await
    }

    async fn route_inner(
        &self,
        task: Task,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> RoutingResult<RoutingDecision> {
        if task.description.trim().is_empty() {
            return Err(RoutingError::EmptyDescription);
        }

        let config = self.config.snapshot();
        let run_start = Instant::now();
        let event_id = self.tracker.start(&task);

        let mut all_scores: IndexMap<String, f64> = IndexMap::new();
        let mut cancelled = false;

        for spec in &config.layers {
            if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                cancelled = true;
                break;
            }

            match self.attempt_layer(&task, spec, cancel.as_mut()).await {
                AttemptResult::Cancelled => {
                    cancelled = true;
                    break;
                }
                AttemptResult::Completed(attempt, best) => {
                    if let Some((target, confidence)) = &best {
                        let entry = all_scores.entry(target.clone()).or_insert(0.0);
                        if *confidence > *entry {
                            *entry = *confidence;
                        }
                    }

                    let success = attempt.success;
                    if let Err(e) = self.tracker.record_attempt(&event_id, attempt) {
                        tracing::warn!(
                            event = "routing.attempt_write_failed",
                            event_id = %event_id,
                            layer = %spec.name,
                            error = %e,
                        );
                    }

                    if success && let Some((target, confidence)) = best {
                        let decision = FinalDecision::routed(
                            target,
                            spec.name.clone(),
                            confidence,
                            all_scores.clone(),
                        );
                        return Ok(self.finish(&event_id, &task, decision, run_start));
                    }
                }
            }
        }

        let decision = if cancelled {
            FinalDecision::cancelled(all_scores)
        } else {
            FinalDecision::clarification(all_scores)
        };
        Ok(self.finish(&event_id, &task, decision, run_start))
    }

    async fn attempt_layer(
        &self,
        task: &Task,
        spec: &LayerSpec,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> AttemptResult {
        let mut attempt = LayerAttempt {
            layer_id: spec.layer_id,
            layer_name: spec.name.clone(),
            attempted: true,
            success: false,
            confidence: 0.0,
            selected_target: None,
            threshold: spec.confidence_threshold,
            latency_ms: 0.0,
            metadata: HashMap::new(),
        };

        let Some(adapter) = self.adapters.get(&spec.name) else {
            // A hot reload can configure a layer this process has no adapter
            // for; record the failed attempt and let the cascade continue.
            attempt
                .metadata
                .insert("error".to_string(), "no adapter registered".into());
            return AttemptResult::Completed(attempt, None);
        };

        let budget = Duration::from_millis(spec.max_latency_budget_ms);
        let started = Instant::now();

        let bounded = timeout(budget, adapter.attempt(task));
        let result = match cancel {
            Some(rx) => {
                tokio::select! {
                    res = bounded => Some(res),
                    _ = wait_for_cancel(rx) => None,
                }
            }
            None => Some(bounded.await),
        };

        attempt.latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut best = None;
        match result {
            None => return AttemptResult::Cancelled,
            Some(Ok(Ok(outcome))) => {
                attempt.metadata = outcome.metadata.clone();
                if let Some((target, confidence)) = outcome.best() {
                    attempt.confidence = confidence;
                    attempt.selected_target = Some(target.to_string());
                    attempt.success = confidence >= spec.confidence_threshold;
                    best = Some((target.to_string(), confidence));
                }
            }
            Some(Ok(Err(e))) => {
                tracing::debug!(
                    event = "routing.layer_error",
                    layer = %spec.name,
                    error = %e,
                );
                attempt
                    .metadata
                    .insert("error".to_string(), e.to_string().into());
            }
            Some(Err(_elapsed)) => {
                tracing::debug!(
                    event = "routing.layer_timeout",
                    layer = %spec.name,
                    budget_ms = spec.max_latency_budget_ms,
                );
                attempt.metadata.insert(
                    "error".to_string(),
                    format!("timeout after {}ms", spec.max_latency_budget_ms).into(),
                );
            }
        }

        tracing::debug!(
            event = "routing.layer_attempted",
            layer = %spec.name,
            confidence = attempt.confidence,
            threshold = spec.confidence_threshold,
            success = attempt.success,
        );

        AttemptResult::Completed(attempt, best)
    }

    fn finish(
        &self,
        event_id: &str,
        task: &Task,
        decision: FinalDecision,
        run_start: Instant,
    ) -> RoutingDecision {
        let total_latency_ms = match self.tracker.finalize(event_id, decision.clone()) {
            Ok(latency) => latency,
            Err(e) => {
                tracing::warn!(
                    event = "routing.finalize_write_failed",
                    event_id = %event_id,
                    error = %e,
                );
                run_start.elapsed().as_secs_f64() * 1000.0
            }
        };

        tracing::info!(
            event = "routing.decided",
            event_id = %event_id,
            task_id = %task.task_id,
            routing_layer = %decision.routing_layer,
            target = decision.selected_target.as_deref().unwrap_or("-"),
            confidence = decision.confidence,
            total_latency_ms = total_latency_ms,
        );

        RoutingDecision::from_final(
            event_id.to_string(),
            task.task_id.clone(),
            &decision,
            total_latency_ms,
        )
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling; cancellation can never fire.
            std::future::pending::<()>().await;
        }
    }
}
