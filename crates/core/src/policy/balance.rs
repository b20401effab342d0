use serde::{Deserialize, Serialize};

use crate::domain::leave::{LeaveKind, LeaveRequest, LeaveStatus};
use crate::policy::{Allotment, LeavePolicy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindBalance {
    pub kind: LeaveKind,
    pub allotment: Allotment,
    pub used: f64,
}

impl KindBalance {
    /// Negative when more days were approved than allotted.
    pub fn remaining(&self) -> Option<f64> {
        self.allotment.days().map(|days| days - self.used)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingPreview {
    pub shown: Vec<LeaveRequest>,
    pub total: usize,
}

impl PendingPreview {
    pub fn overflow(&self) -> usize {
        self.total.saturating_sub(self.shown.len())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub year: i32,
    pub balances: Vec<KindBalance>,
    pub pending: PendingPreview,
}

impl BalanceReport {
    pub fn for_kind(&self, kind: LeaveKind) -> Option<&KindBalance> {
        self.balances.iter().find(|balance| balance.kind == kind)
    }
}

/// Days consumed by approved requests of `kind` lying entirely inside `year`.
pub fn used_days<'a, I>(requests: I, kind: LeaveKind, year: i32) -> f64
where
    I: IntoIterator<Item = &'a LeaveRequest>,
{
    requests
        .into_iter()
        .filter(|request| {
            request.status == LeaveStatus::Approved
                && request.kind == kind
                && request.window.within_year(year)
        })
        .map(LeaveRequest::duration_days)
        .sum()
}

impl LeavePolicy {
    /// Balance over every tracked kind plus a capped preview of pending requests.
    ///
    /// `requests` is the owner's full history; filtering happens here so the
    /// result depends only on the records passed in.
    pub fn compute_balance(
        &self,
        year: i32,
        requests: &[LeaveRequest],
        pending_preview: usize,
    ) -> BalanceReport {
        let balances = self
            .tracked_kinds()
            .into_iter()
            .map(|kind| KindBalance {
                kind,
                allotment: self.allotment(kind),
                used: used_days(requests, kind, year),
            })
            .collect();

        let mut pending: Vec<LeaveRequest> = requests
            .iter()
            .filter(|request| request.status == LeaveStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|request| (request.window.start(), request.id));
        let total = pending.len();
        pending.truncate(pending_preview);

        BalanceReport { year, balances, pending: PendingPreview { shown: pending, total } }
    }
}
