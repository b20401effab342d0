pub mod balance;
pub mod eligibility;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::leave::LeaveKind;

pub use balance::{BalanceReport, KindBalance, PendingPreview};
pub use eligibility::EligibilityVerdict;

pub const DEFAULT_NOTICE_DAYS: i64 = 14;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allotment {
    Days(f64),
    Unlimited,
}

impl Allotment {
    pub fn days(&self) -> Option<f64> {
        match self {
            Self::Days(days) => Some(*days),
            Self::Unlimited => None,
        }
    }
}

/// Annual allotments per leave kind and the notice expected before a leave starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeavePolicy {
    allotments: BTreeMap<LeaveKind, Allotment>,
    notice_days: i64,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        let allotments = BTreeMap::from([
            (LeaveKind::Annual, Allotment::Days(20.0)),
            (LeaveKind::Sick, Allotment::Days(10.0)),
            (LeaveKind::Personal, Allotment::Days(5.0)),
            (LeaveKind::Bereavement, Allotment::Days(5.0)),
            (LeaveKind::Parental, Allotment::Days(84.0)),
            (LeaveKind::Unpaid, Allotment::Unlimited),
        ]);
        Self { allotments, notice_days: DEFAULT_NOTICE_DAYS }
    }
}

impl LeavePolicy {
    pub fn new(allotments: BTreeMap<LeaveKind, Allotment>, notice_days: i64) -> Self {
        let mut policy = Self { allotments: BTreeMap::new(), notice_days };
        for kind in LeaveKind::ALL {
            let allotment = allotments.get(&kind).copied().unwrap_or(Allotment::Days(0.0));
            policy.allotments.insert(kind, allotment);
        }
        policy
    }

    pub fn allotment(&self, kind: LeaveKind) -> Allotment {
        self.allotments.get(&kind).copied().unwrap_or(Allotment::Days(0.0))
    }

    pub fn notice_days(&self) -> i64 {
        self.notice_days
    }

    /// Kinds reported in a balance summary, in display order.
    pub fn tracked_kinds(&self) -> Vec<LeaveKind> {
        LeaveKind::ALL
            .into_iter()
            .filter(|kind| matches!(self.allotment(*kind), Allotment::Days(_)))
            .collect()
    }

    /// Policy text handed to the NLU gateway for general leave questions.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for kind in LeaveKind::ALL {
            let line = match self.allotment(kind) {
                Allotment::Days(days) => format!(
                    "- {} leave: {} days per year",
                    kind.label(),
                    crate::domain::leave::format_days(days)
                ),
                Allotment::Unlimited => format!(
                    "- {} leave: considered case by case after paid leave is exhausted",
                    kind.label()
                ),
            };
            lines.push(line);
        }
        lines.push("- Sick leave requires a doctor's note for 3+ consecutive days".to_owned());
        lines.push(format!(
            "- Leave requests should be submitted at least {} days in advance except for sick leave and emergencies",
            self.notice_days
        ));
        lines.push("- All leave requests require manager or HR approval".to_owned());
        lines.push("- Up to 5 days of annual leave can be carried over to next year".to_owned());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Allotment, LeavePolicy};
    use crate::domain::leave::LeaveKind;

    #[test]
    fn default_policy_matches_company_allotments() {
        let policy = LeavePolicy::default();
        assert_eq!(policy.allotment(LeaveKind::Annual), Allotment::Days(20.0));
        assert_eq!(policy.allotment(LeaveKind::Sick), Allotment::Days(10.0));
        assert_eq!(policy.allotment(LeaveKind::Personal), Allotment::Days(5.0));
        assert_eq!(policy.allotment(LeaveKind::Unpaid), Allotment::Unlimited);
        assert_eq!(policy.notice_days(), 14);
        assert!(!policy.tracked_kinds().contains(&LeaveKind::Unpaid));
    }

    #[test]
    fn missing_kinds_default_to_zero_days() {
        let policy =
            LeavePolicy::new(BTreeMap::from([(LeaveKind::Annual, Allotment::Days(25.0))]), 7);
        assert_eq!(policy.allotment(LeaveKind::Annual), Allotment::Days(25.0));
        assert_eq!(policy.allotment(LeaveKind::Sick), Allotment::Days(0.0));
        assert!(policy.describe().contains("at least 7 days in advance"));
    }
}
