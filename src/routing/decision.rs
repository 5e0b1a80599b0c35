use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::telemetry::{CANCELLED_LAYER, CLARIFICATION_LAYER, FinalDecision};

/// What `route()` hands back to the caller: the final decision plus the
/// telemetry correlation id the outcome source will need later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub event_id: String,
    pub task_id: String,
    pub selected_target: Option<String>,
    pub routing_layer: String,
    pub confidence: f64,
    pub all_candidate_scores: IndexMap<String, f64>,
    pub total_latency_ms: f64,
}

impl RoutingDecision {
    pub(crate) fn from_final(
        event_id: String,
        task_id: String,
        decision: &FinalDecision,
        total_latency_ms: f64,
    ) -> Self {
        Self {
            event_id,
            task_id,
            selected_target: decision.selected_target.clone(),
            routing_layer: decision.routing_layer.clone(),
            confidence: decision.confidence,
            all_candidate_scores: decision.all_candidate_scores.clone(),
            total_latency_ms,
        }
    }

    /// No layer was confident enough; a human or higher-level process must
    /// disambiguate using `all_candidate_scores`.
    pub fn is_clarification(&self) -> bool {
        self.routing_layer == CLARIFICATION_LAYER
    }

    pub fn is_cancelled(&self) -> bool {
        self.routing_layer == CANCELLED_LAYER
    }
}
