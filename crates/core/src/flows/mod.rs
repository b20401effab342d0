pub mod engine;
pub mod states;

pub use engine::{LeaveLifecycle, LeaveTransitionError};
pub use states::{LeaveAction, LeaveEvent, TransitionOutcome};
