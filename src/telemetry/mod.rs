pub mod error;
pub mod feedback;
pub mod store;
pub mod tracker;
pub mod types;

pub use error::{TelemetryError, TelemetryResult};
pub use feedback::derive_feedback;
pub use store::{EventRecord, EventStore};
pub use tracker::PerformanceTracker;
pub use types::{
    CANCELLED_LAYER, CLARIFICATION_LAYER, Feedback, FeedbackSignal, FinalDecision, LayerAttempt,
    LayerFeedback, Outcome, OutcomeStatus, RoutingEvent,
};
