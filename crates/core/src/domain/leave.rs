use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaveRequestId(pub i64);

impl std::fmt::Display for LeaveRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Annual,
    Sick,
    Personal,
    Bereavement,
    Parental,
    Unpaid,
}

impl LeaveKind {
    pub const ALL: [LeaveKind; 6] = [
        Self::Annual,
        Self::Sick,
        Self::Personal,
        Self::Bereavement,
        Self::Parental,
        Self::Unpaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Sick => "sick",
            Self::Personal => "personal",
            Self::Bereavement => "bereavement",
            Self::Parental => "parental",
            Self::Unpaid => "unpaid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Annual => "Annual",
            Self::Sick => "Sick",
            Self::Personal => "Personal",
            Self::Bereavement => "Bereavement",
            Self::Parental => "Parental",
            Self::Unpaid => "Unpaid",
        }
    }
}

impl std::str::FromStr for LeaveKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownLeaveKind(value.trim().to_string()))
    }
}

impl std::fmt::Display for LeaveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub const ALL: [LeaveStatus; 4] =
        [Self::Pending, Self::Approved, Self::Rejected, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Approved => "✅",
            Self::Rejected => "❌",
            Self::Cancelled => "🚫",
        }
    }

    /// The only legal lifecycle edges. Everything else is an error, never a no-op.
    pub fn can_transition_to(&self, next: LeaveStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Approved, Self::Cancelled)
        )
    }
}

impl std::str::FromStr for LeaveStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!("unknown leave status `{value}`"))
            })
    }
}

/// Inclusive date span of a leave. `end >= start` holds by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl LeaveWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn duration_days(&self, half_day: bool) -> f64 {
        let days = self.span_days() as f64;
        if half_day {
            days - 0.5
        } else {
            days
        }
    }

    pub fn within_year(&self, year: i32) -> bool {
        self.start.year() == year && self.end.year() == year
    }

    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start <= to && self.end >= from
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| DomainError::InvalidDate(value.trim().to_string()))
}

/// Renders whole days without a fraction and half days with one digit.
pub fn format_days(days: f64) -> String {
    if days.fract() == 0.0 {
        format!("{days:.0}")
    } else {
        format!("{days:.1}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewLeaveRequest {
    pub employee_id: UserId,
    pub kind: LeaveKind,
    pub window: LeaveWindow,
    pub half_day: bool,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub employee_id: UserId,
    pub kind: LeaveKind,
    pub window: LeaveWindow,
    pub half_day: bool,
    pub reason: String,
    pub status: LeaveStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn duration_days(&self) -> f64 {
        self.window.duration_days(self.half_day)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} leave from {} to {} ({} day(s))",
            self.kind.label(),
            self.window.start(),
            self.window.end(),
            format_days(self.duration_days())
        )
    }
}

/// Decision fields stamped together with a status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveDecision {
    pub decided_by: Option<UserId>,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}
