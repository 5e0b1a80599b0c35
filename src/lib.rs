pub mod backends;
pub mod cli;
pub mod config;
pub mod console;
pub mod layers;
pub mod registry;
pub mod routing;
pub mod telemetry;
pub mod tuning;

pub use backends::{ClassifierBackend, EmbeddingBackend, RetrievalBackend};
pub use config::{ConfigStore, LayerSpec, RouterConfig};
pub use console::{Console, VerbosityLevel, console, init_console};
pub use layers::{LayerAdapter, LayerOutcome};
pub use registry::TargetRegistry;
pub use routing::{CascadeOrchestrator, RoutingDecision, RoutingError, Task};
pub use telemetry::{
    EventStore, Feedback, FinalDecision, LayerAttempt, Outcome, OutcomeStatus, PerformanceTracker,
    RoutingEvent,
};
pub use tuning::{ThresholdTuner, TuneParams, TuneReport};
