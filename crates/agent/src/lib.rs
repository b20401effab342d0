//! Message routing and the leave request lifecycle.
//!
//! An inbound message flows through a constrained loop:
//! 1. **Classification** (`classifier`) maps free text to a closed category set.
//! 2. **Dispatch** (`handlers`) hands the message to the handler registered for the category.
//! 3. **Lifecycle** (`lifecycle`) owns every leave request mutation and derived report.
//! 4. **Arbitration** (`orchestrator`) reconciles a low-confidence answer with the general one.
//!
//! The NLU gateway is strictly a translator. It never decides balances, eligibility,
//! permissions or state transitions; those are deterministic decisions made here and
//! in `leavedesk-core`.

pub mod calendar;
pub mod classifier;
pub mod directory;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod wiring;

pub use classifier::{Category, Classification, IntentClassifier};
pub use errors::{DirectoryError, ExtractionError, GatewayError, LeaveEngineError};
pub use lifecycle::{EngineSettings, LeaveEngine};
pub use orchestrator::{Orchestrator, RouteOutcome, RoutingPolicy};
pub use wiring::{assemble, Collaborators};
