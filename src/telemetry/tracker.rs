use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use super::error::{TelemetryError, TelemetryResult};
use super::feedback::derive_feedback;
use super::store::{EventRecord, EventStore};
use super::types::{Feedback, FinalDecision, LayerAttempt, Outcome};
use crate::routing::Task;

struct InFlightEvent {
    started: Instant,
}

/// Append-only telemetry sink for cascade runs.
///
/// Routing correctness never depends on this component: every write during a
/// cascade is best-effort from the orchestrator's point of view, and a
/// persistence failure costs observability for that event, nothing more.
pub struct PerformanceTracker {
    store: EventStore,
    in_flight: Mutex<HashMap<String, InFlightEvent>>,
}

impl PerformanceTracker {
    pub fn new(store: EventStore) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    fn in_flight_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlightEvent>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocate a RoutingEvent for a cascade run. The event id exists before
    /// any layer attempt begins; the `started` record itself is best-effort.
    pub fn start(&self, task: &Task) -> String {
        let event_id = format!("evt-{}", Uuid::new_v4());

        self.in_flight_lock().insert(
            event_id.clone(),
            InFlightEvent {
                started: Instant::now(),
            },
        );

        if let Err(e) = self.store.append(&EventRecord::Started {
            event_id: event_id.clone(),
            task_id: task.task_id.clone(),
            task_description: task.description.clone(),
            created_at: Utc::now(),
        }) {
            tracing::warn!(
                event = "telemetry.start_write_failed",
                event_id = %event_id,
                error = %e,
            );
        }

        event_id
    }

    pub fn record_attempt(&self, event_id: &str, attempt: LayerAttempt) -> TelemetryResult<()> {
        self.store.append(&EventRecord::Attempt {
            event_id: event_id.to_string(),
            attempt,
        })
    }

    /// Mark the event complete. Returns the wall-clock total latency it
    /// computed for the run.
    pub fn finalize(&self, event_id: &str, decision: FinalDecision) -> TelemetryResult<f64> {
        let in_flight = self.in_flight_lock().remove(event_id);
        let total_latency_ms = in_flight
            .map(|e| e.started.elapsed().as_secs_f64() * 1000.0)
            .ok_or_else(|| TelemetryError::EventNotFound {
                event_id: event_id.to_string(),
            })?;

        self.store.append(&EventRecord::Finalized {
            event_id: event_id.to_string(),
            decision,
            total_latency_ms,
        })?;

        Ok(total_latency_ms)
    }

    /// Attach the real-world outcome to a finalized event, minutes or hours
    /// after the cascade ran. Re-reads the event's recorded attempts and
    /// derives tuning feedback from them. Idempotent: a repeated submission
    /// appends another record and the fold keeps the latest.
    pub fn record_outcome(&self, event_id: &str, outcome: Outcome) -> TelemetryResult<Feedback> {
        let event = self
            .store
            .load_event(event_id)?
            .ok_or_else(|| TelemetryError::EventNotFound {
                event_id: event_id.to_string(),
            })?;

        let decision = event
            .final_decision
            .as_ref()
            .ok_or_else(|| TelemetryError::NotFinalized {
                event_id: event_id.to_string(),
            })?;

        let feedback = derive_feedback(&event.layer_attempts, decision, &outcome);

        self.store.append(&EventRecord::Outcome {
            event_id: event_id.to_string(),
            outcome,
            feedback: feedback.clone(),
            recorded_at: Utc::now(),
        })?;

        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::{FeedbackSignal, OutcomeStatus};
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn tracker() -> (PerformanceTracker, TempDir) {
        let dir = TempDir::new().unwrap();
        let tracker = PerformanceTracker::new(EventStore::new(dir.path().join("events.jsonl")));
        (tracker, dir)
    }

    fn attempt(layer_id: u32, name: &str, confidence: f64, threshold: f64) -> LayerAttempt {
        LayerAttempt {
            layer_id,
            layer_name: name.to_string(),
            attempted: true,
            success: confidence >= threshold,
            confidence,
            selected_target: Some("development-master".to_string()),
            threshold,
            latency_ms: 0.5,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_full_lifecycle_start_attempt_finalize() {
        let (tracker, _dir) = tracker();
        let task = Task::new("fix the login bug");
        let event_id = tracker.start(&task);

        tracker
            .record_attempt(&event_id, attempt(1, "keyword", 0.82, 0.85))
            .unwrap();
        tracker
            .record_attempt(&event_id, attempt(2, "semantic", 0.91, 0.70))
            .unwrap();

        let latency = tracker
            .finalize(
                &event_id,
                FinalDecision::routed(
                    "development-master".to_string(),
                    "semantic".to_string(),
                    0.91,
                    IndexMap::new(),
                ),
            )
            .unwrap();
        assert!(latency >= 0.0);

        let event = tracker.store().load_event(&event_id).unwrap().unwrap();
        assert_eq!(event.task_id, task.task_id);
        assert_eq!(event.layer_attempts.len(), 2);
        assert!(event.is_finalized());
    }

    #[test]
    fn test_finalize_unknown_event_fails() {
        let (tracker, _dir) = tracker();
        let result = tracker.finalize(
            "evt-missing",
            FinalDecision::clarification(IndexMap::new()),
        );
        assert!(matches!(result, Err(TelemetryError::EventNotFound { .. })));
    }

    #[test]
    fn test_record_outcome_derives_feedback_from_recorded_attempts() {
        let (tracker, _dir) = tracker();
        let event_id = tracker.start(&Task::new("fix the login bug"));
        tracker
            .record_attempt(&event_id, attempt(1, "keyword", 0.82, 0.85))
            .unwrap();
        tracker
            .record_attempt(&event_id, attempt(2, "semantic", 0.91, 0.70))
            .unwrap();
        tracker
            .finalize(
                &event_id,
                FinalDecision::routed(
                    "development-master".to_string(),
                    "semantic".to_string(),
                    0.91,
                    IndexMap::new(),
                ),
            )
            .unwrap();

        let feedback = tracker
            .record_outcome(
                &event_id,
                Outcome {
                    task_completed: true,
                    status: OutcomeStatus::Completed,
                    was_correct_target: Some(true),
                    corrected_to: None,
                    completion_time_minutes: Some(30.0),
                    quality_score: Some(0.95),
                },
            )
            .unwrap();

        assert_eq!(feedback.count(FeedbackSignal::ThresholdTooHigh), 1);
        assert_eq!(feedback.count(FeedbackSignal::Confirmed), 1);

        let event = tracker.store().load_event(&event_id).unwrap().unwrap();
        assert!(event.outcome.is_some());
        assert!(event.learning_feedback.is_some());
    }

    #[test]
    fn test_record_outcome_requires_finalized_event() {
        let (tracker, _dir) = tracker();
        let event_id = tracker.start(&Task::new("fix the login bug"));
        let result = tracker.record_outcome(
            &event_id,
            Outcome {
                task_completed: true,
                status: OutcomeStatus::Completed,
                was_correct_target: Some(true),
                corrected_to: None,
                completion_time_minutes: None,
                quality_score: None,
            },
        );
        assert!(matches!(result, Err(TelemetryError::NotFinalized { .. })));
    }

    #[test]
    fn test_repeated_outcome_submission_overwrites() {
        let (tracker, _dir) = tracker();
        let event_id = tracker.start(&Task::new("fix the login bug"));
        tracker
            .finalize(
                &event_id,
                FinalDecision::routed(
                    "development-master".to_string(),
                    "keyword".to_string(),
                    0.9,
                    IndexMap::new(),
                ),
            )
            .unwrap();

        let base = Outcome {
            task_completed: true,
            status: OutcomeStatus::Completed,
            was_correct_target: Some(true),
            corrected_to: None,
            completion_time_minutes: None,
            quality_score: None,
        };
        tracker.record_outcome(&event_id, base.clone()).unwrap();
        tracker
            .record_outcome(
                &event_id,
                Outcome {
                    was_correct_target: Some(false),
                    corrected_to: Some("devops-master".to_string()),
                    ..base
                },
            )
            .unwrap();

        let event = tracker.store().load_event(&event_id).unwrap().unwrap();
        let outcome = event.outcome.unwrap();
        assert_eq!(outcome.was_correct_target, Some(false));
        assert_eq!(outcome.corrected_to, Some("devops-master".to_string()));
    }
}
