use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Synthetic routing layer recorded when no configured layer was confident
/// enough and the decision falls to a human or higher-level process.
pub const CLARIFICATION_LAYER: &str = "clarification";

/// Synthetic routing layer recorded when the caller cancelled the run before
/// any layer accepted.
pub const CANCELLED_LAYER: &str = "cancelled";

/// One layer tried during a cascade run. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerAttempt {
    pub layer_id: u32,
    pub layer_name: String,
    pub attempted: bool,
    pub success: bool,
    pub confidence: f64,
    pub selected_target: Option<String>,
    /// Threshold in force when the attempt ran. Thresholds drift under
    /// tuning, so feedback must compare against this value, not the live
    /// configuration.
    pub threshold: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDecision {
    pub selected_target: Option<String>,
    pub routing_layer: String,
    pub confidence: f64,
    #[serde(default)]
    pub all_candidate_scores: IndexMap<String, f64>,
}

impl FinalDecision {
    pub fn routed(
        target: String,
        routing_layer: String,
        confidence: f64,
        all_candidate_scores: IndexMap<String, f64>,
    ) -> Self {
        Self {
            selected_target: Some(target),
            routing_layer,
            confidence,
            all_candidate_scores,
        }
    }

    /// Terminal fallback: certain that no automatic decision could be made.
    pub fn clarification(all_candidate_scores: IndexMap<String, f64>) -> Self {
        Self {
            selected_target: None,
            routing_layer: CLARIFICATION_LAYER.to_string(),
            confidence: 1.0,
            all_candidate_scores,
        }
    }

    pub fn cancelled(all_candidate_scores: IndexMap<String, f64>) -> Self {
        Self {
            selected_target: None,
            routing_layer: CANCELLED_LAYER.to_string(),
            confidence: 0.0,
            all_candidate_scores,
        }
    }

    pub fn is_clarification(&self) -> bool {
        self.routing_layer == CLARIFICATION_LAYER
    }

    pub fn is_cancelled(&self) -> bool {
        self.routing_layer == CANCELLED_LAYER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    InProgress,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Completed => write!(f, "completed"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::InProgress => write!(f, "in_progress"),
        }
    }
}

impl std::str::FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(OutcomeStatus::Completed),
            "failed" => Ok(OutcomeStatus::Failed),
            "in_progress" | "in-progress" => Ok(OutcomeStatus::InProgress),
            _ => Err(format!("Unknown outcome status: {}", s)),
        }
    }
}

/// Real-world result of the routed task, pushed by the execution system at
/// an arbitrary later time. Optional per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub task_completed: bool,
    pub status: OutcomeStatus,
    pub was_correct_target: Option<bool>,
    pub corrected_to: Option<String>,
    pub completion_time_minutes: Option<f64>,
    pub quality_score: Option<f64>,
}

impl Outcome {
    /// The target that should have been chosen, when the outcome pins it
    /// down: an explicit correction, or the routed target confirmed correct.
    pub fn true_target(&self, routed_target: Option<&str>) -> Option<String> {
        if let Some(corrected) = &self.corrected_to {
            return Some(corrected.clone());
        }
        if self.was_correct_target == Some(true) {
            return routed_target.map(|t| t.to_string());
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    /// Accepted the task and was right.
    Confirmed,
    /// Deferred, and its answer would have been wrong anyway.
    CorrectDeferral,
    /// Had the right answer but sat below threshold: a missed opportunity.
    ThresholdTooHigh,
    /// Accepted with the wrong answer: a false positive.
    ThresholdTooLow,
    /// No ground truth to judge against.
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerFeedback {
    pub layer_id: u32,
    pub layer_name: String,
    pub confidence: f64,
    pub threshold: f64,
    pub signal: FeedbackSignal,
}

/// Derived from an [`Outcome`] plus the recorded layer attempts; consumed by
/// the threshold tuner, never supplied by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub true_target: Option<String>,
    pub signals: Vec<LayerFeedback>,
}

impl Feedback {
    pub fn count(&self, signal: FeedbackSignal) -> usize {
        self.signals.iter().filter(|s| s.signal == signal).count()
    }
}

/// Complete telemetry record of one cascade run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEvent {
    pub event_id: String,
    pub task_id: String,
    pub task_description: String,
    pub created_at: DateTime<Utc>,
    pub layer_attempts: Vec<LayerAttempt>,
    pub final_decision: Option<FinalDecision>,
    pub total_latency_ms: Option<f64>,
    pub outcome: Option<Outcome>,
    pub learning_feedback: Option<Feedback>,
}

impl RoutingEvent {
    pub fn started(
        event_id: String,
        task_id: String,
        task_description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            task_id,
            task_description,
            created_at,
            layer_attempts: Vec::new(),
            final_decision: None,
            total_latency_ms: None,
            outcome: None,
            learning_feedback: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.final_decision.is_some()
    }

    pub fn attempt_for(&self, layer_name: &str) -> Option<&LayerAttempt> {
        self.layer_attempts.iter().find(|a| a.layer_name == layer_name)
    }
}
