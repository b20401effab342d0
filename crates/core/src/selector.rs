use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::leave::LeaveRequestId;

pub const DEFAULT_DISAMBIGUATION_LIMIT: usize = 5;

/// Optional filters identifying which leave request an operation targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveSelector {
    pub request_id: Option<LeaveRequestId>,
    /// Case-insensitive substring of the owner's display name.
    pub employee_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl LeaveSelector {
    pub fn by_id(id: LeaveRequestId) -> Self {
        Self { request_id: Some(id), ..Self::default() }
    }

    pub fn by_employee_name(name: impl Into<String>) -> Self {
        Self { employee_name: Some(name.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_none()
            && self.employee_name.as_deref().map(str::trim).unwrap_or_default().is_empty()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorResolution<T> {
    NotFound,
    /// More than one match; `candidates` holds at most the disambiguation limit.
    Ambiguous { candidates: Vec<T>, total: usize },
    Unique(T),
}

impl<T> SelectorResolution<T> {
    pub fn from_matches(mut matches: Vec<T>, limit: usize) -> Self {
        match matches.len() {
            0 => Self::NotFound,
            1 => match matches.pop() {
                Some(only) => Self::Unique(only),
                None => Self::NotFound,
            },
            total => {
                matches.truncate(limit);
                Self::Ambiguous { candidates: matches, total }
            }
        }
    }
}
