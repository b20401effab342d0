use serde::{Deserialize, Serialize};

use crate::domain::leave::LeaveStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveEvent {
    Approve,
    Reject,
    Cancel,
}

impl LeaveEvent {
    pub fn target(&self) -> LeaveStatus {
        match self {
            Self::Approve => LeaveStatus::Approved,
            Self::Reject => LeaveStatus::Rejected,
            Self::Cancel => LeaveStatus::Cancelled,
        }
    }

    /// Source states from which this event is legal.
    pub fn eligible_sources(&self) -> Vec<LeaveStatus> {
        let target = self.target();
        LeaveStatus::ALL.into_iter().filter(|status| status.can_transition_to(target)).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveAction {
    CreateCalendarEvent,
    DeleteCalendarEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: LeaveStatus,
    pub to: LeaveStatus,
    pub event: LeaveEvent,
    pub actions: Vec<LeaveAction>,
}
