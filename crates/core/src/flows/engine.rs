use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::leave::LeaveStatus;
use crate::flows::states::{LeaveAction, LeaveEvent, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LeaveTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: LeaveStatus, event: LeaveEvent },
}

/// Pure state machine for a single leave request.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeaveLifecycle;

impl LeaveLifecycle {
    pub fn initial_state(&self) -> LeaveStatus {
        LeaveStatus::Pending
    }

    pub fn apply(
        &self,
        current: LeaveStatus,
        event: LeaveEvent,
    ) -> Result<TransitionOutcome, LeaveTransitionError> {
        let to = event.target();
        if !current.can_transition_to(to) {
            return Err(LeaveTransitionError::InvalidTransition { state: current, event });
        }

        let actions = match (current, event) {
            (LeaveStatus::Pending, LeaveEvent::Approve) => vec![LeaveAction::CreateCalendarEvent],
            (LeaveStatus::Approved, LeaveEvent::Cancel) => vec![LeaveAction::DeleteCalendarEvent],
            _ => Vec::new(),
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: LeaveStatus,
        event: LeaveEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LeaveTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    audit,
                    "leave.transition_applied",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("event", outcome.event.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    audit,
                    "leave.transition_rejected",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Rejected,
                )
                .with_metadata("from", current.as_str())
                .with_metadata("event", event.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::leave::{LeaveRequestId, LeaveStatus};
    use crate::flows::engine::{LeaveLifecycle, LeaveTransitionError};
    use crate::flows::states::{LeaveAction, LeaveEvent};

    const EVENTS: [LeaveEvent; 3] = [LeaveEvent::Approve, LeaveEvent::Reject, LeaveEvent::Cancel];

    #[test]
    fn pending_accepts_every_event() {
        let lifecycle = LeaveLifecycle;
        let pending = lifecycle.initial_state();

        let approved = lifecycle.apply(pending, LeaveEvent::Approve).expect("pending -> approved");
        assert_eq!(approved.to, LeaveStatus::Approved);
        assert_eq!(approved.actions, vec![LeaveAction::CreateCalendarEvent]);

        let rejected = lifecycle.apply(pending, LeaveEvent::Reject).expect("pending -> rejected");
        assert_eq!(rejected.to, LeaveStatus::Rejected);
        assert!(rejected.actions.is_empty());

        let cancelled = lifecycle.apply(pending, LeaveEvent::Cancel).expect("pending -> cancelled");
        assert_eq!(cancelled.to, LeaveStatus::Cancelled);
        assert!(cancelled.actions.is_empty());
    }

    #[test]
    fn approved_only_accepts_cancel_and_removes_calendar_event() {
        let lifecycle = LeaveLifecycle;
        let outcome = lifecycle
            .apply(LeaveStatus::Approved, LeaveEvent::Cancel)
            .expect("approved -> cancelled");
        assert_eq!(outcome.actions, vec![LeaveAction::DeleteCalendarEvent]);

        for event in [LeaveEvent::Approve, LeaveEvent::Reject] {
            assert!(lifecycle.apply(LeaveStatus::Approved, event).is_err());
        }
    }

    #[test]
    fn terminal_states_reject_every_event() {
        let lifecycle = LeaveLifecycle;
        for state in [LeaveStatus::Rejected, LeaveStatus::Cancelled] {
            for event in EVENTS {
                let error = lifecycle.apply(state, event).expect_err("terminal state");
                assert_eq!(error, LeaveTransitionError::InvalidTransition { state, event });
            }
        }
    }

    #[test]
    fn eligible_sources_follow_the_transition_table() {
        assert_eq!(LeaveEvent::Approve.eligible_sources(), vec![LeaveStatus::Pending]);
        assert_eq!(LeaveEvent::Reject.eligible_sources(), vec![LeaveStatus::Pending]);
        assert_eq!(
            LeaveEvent::Cancel.eligible_sources(),
            vec![LeaveStatus::Pending, LeaveStatus::Approved]
        );
    }

    #[test]
    fn audited_transitions_record_applied_and_rejected_events() {
        let lifecycle = LeaveLifecycle;
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(Some(LeaveRequestId(7)), "req-42", "U-manager");

        lifecycle
            .apply_with_audit(LeaveStatus::Pending, LeaveEvent::Approve, &sink, &context)
            .expect("transition should succeed");
        let _ =
            lifecycle.apply_with_audit(LeaveStatus::Rejected, LeaveEvent::Cancel, &sink, &context);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "leave.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("approved"));
        assert_eq!(events[1].event_type, "leave.transition_rejected");
        assert_eq!(events[1].leave_request_id, Some(LeaveRequestId(7)));
    }
}
