pub mod decision;
pub mod errors;
pub mod orchestrator;
pub mod task;


pub use decision::RoutingDecision;
pub use errors::{RoutingError, RoutingResult};
pub use orchestrator::{CascadeBuilder, CascadeOrchestrator};
pub use task::Task;
