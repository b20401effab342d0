pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod policy;
pub mod selector;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::conversation::{ConversationContext, ConversationTurn, TurnRole};
pub use domain::leave::{
    LeaveDecision, LeaveKind, LeaveRequest, LeaveRequestId, LeaveStatus, LeaveWindow,
    NewLeaveRequest,
};
pub use domain::user::{Role, User, UserId, UserProfile};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{LeaveAction, LeaveEvent, LeaveLifecycle, LeaveTransitionError};
pub use policy::{Allotment, BalanceReport, EligibilityVerdict, LeavePolicy};
pub use selector::{LeaveSelector, SelectorResolution};
