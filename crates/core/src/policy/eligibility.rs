use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::leave::{format_days, LeaveKind, LeaveRequest, LeaveWindow};
use crate::policy::balance::used_days;
use crate::policy::{Allotment, LeavePolicy};

/// Advisory result; never blocks a submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: Option<String>,
    pub warning: Option<String>,
}

impl EligibilityVerdict {
    fn eligible() -> Self {
        Self { eligible: true, reason: None, warning: None }
    }

    fn ineligible(reason: String) -> Self {
        Self { eligible: false, reason: Some(reason), warning: None }
    }
}

impl LeavePolicy {
    pub fn check_eligibility(
        &self,
        kind: &str,
        window: LeaveWindow,
        today: NaiveDate,
        history: &[LeaveRequest],
    ) -> EligibilityVerdict {
        let Ok(kind) = kind.parse::<LeaveKind>() else {
            return EligibilityVerdict::ineligible(format!("Invalid leave type: {}", kind.trim()));
        };

        let requested = window.span_days() as f64;
        if let Allotment::Days(allotted) = self.allotment(kind) {
            let remaining = allotted - used_days(history, kind, today.year());
            if remaining < requested {
                return EligibilityVerdict::ineligible(format!(
                    "Insufficient {kind} leave balance. Requested: {} days, Available: {} days",
                    format_days(requested),
                    format_days(remaining)
                ));
            }
        }

        let notice = (window.start() - today).num_days();
        let mut verdict = EligibilityVerdict::eligible();
        if kind != LeaveKind::Sick && notice < self.notice_days() {
            verdict.warning = Some(format!(
                "Leave requested with only {notice} days notice. Company policy recommends {} days notice.",
                self.notice_days()
            ));
        }
        verdict
    }
}
