use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use leavedesk_core::domain::conversation::ConversationTurn;
use leavedesk_core::domain::leave::{
    LeaveDecision, LeaveRequest, LeaveRequestId, LeaveStatus, NewLeaveRequest,
};
use leavedesk_core::domain::user::{User, UserId};
use leavedesk_core::errors::ApplicationError;

pub mod conversation;
pub mod leave_request;
pub mod memory;
pub mod user;

pub use conversation::SqlConversationRepository;
pub use leave_request::SqlLeaveRequestRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryLeaveRequestRepository, InMemoryUserRepository,
};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// A leave request joined with the owner fields needed for replies and calendar effects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub request: LeaveRequest,
    pub employee_name: String,
    pub employee_email: String,
}

/// Filters for leave lookups. Empty filters match everything.
///
/// Results are always ordered by start date ascending, then id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaveQuery {
    pub request_id: Option<LeaveRequestId>,
    pub employee_ids: Option<Vec<UserId>>,
    /// Substring of the owner's username, ASCII case-insensitive like sqlite's `LOWER`.
    pub employee_name: Option<String>,
    pub statuses: Vec<LeaveStatus>,
    pub start_on_or_after: Option<NaiveDate>,
    pub start_on_or_before: Option<NaiveDate>,
    pub end_on_or_after: Option<NaiveDate>,
    pub end_on_or_before: Option<NaiveDate>,
    /// Leaves overlapping the inclusive range.
    pub overlapping: Option<(NaiveDate, NaiveDate)>,
    pub limit: Option<usize>,
}

impl LeaveQuery {
    pub fn for_employee(employee_id: UserId) -> Self {
        Self { employee_ids: Some(vec![employee_id]), ..Self::default() }
    }

    pub fn with_statuses(mut self, statuses: impl Into<Vec<LeaveStatus>>) -> Self {
        self.statuses = statuses.into();
        self
    }

    pub fn matches(&self, record: &LeaveRecord) -> bool {
        let request = &record.request;
        if self.request_id.is_some_and(|id| id != request.id) {
            return false;
        }
        if let Some(ids) = &self.employee_ids {
            if !ids.contains(&request.employee_id) {
                return false;
            }
        }
        if let Some(name) = &self.employee_name {
            if !name_contains(&record.employee_name, name) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&request.status) {
            return false;
        }
        if self.start_on_or_after.is_some_and(|date| request.window.start() < date) {
            return false;
        }
        if self.start_on_or_before.is_some_and(|date| request.window.start() > date) {
            return false;
        }
        if self.end_on_or_after.is_some_and(|date| request.window.end() < date) {
            return false;
        }
        if self.end_on_or_before.is_some_and(|date| request.window.end() > date) {
            return false;
        }
        if let Some((from, to)) = self.overlapping {
            if !request.window.overlaps(from, to) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Matches the email address or phone number.
    async fn find_by_contact(&self, handle: &str) -> Result<Option<User>, RepositoryError>;
    /// ASCII case-insensitive substring match on the username, ordered by username.
    async fn search_by_name(&self, fragment: &str) -> Result<Vec<User>, RepositoryError>;
    async fn list_direct_reports(&self, manager_id: &UserId) -> Result<Vec<User>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LeaveRequestRepository: Send + Sync {
    async fn insert(
        &self,
        request: NewLeaveRequest,
        created_at: DateTime<Utc>,
    ) -> Result<LeaveRequest, RepositoryError>;

    async fn find_by_id(&self, id: LeaveRequestId) -> Result<Option<LeaveRecord>, RepositoryError>;

    async fn query(&self, query: &LeaveQuery) -> Result<Vec<LeaveRecord>, RepositoryError>;

    /// Moves the row from `expected` to `to` atomically.
    ///
    /// The status check and the write are one statement. Returns `None` when the row no
    /// longer has the expected status, including when a concurrent caller moved it first.
    async fn transition_status(
        &self,
        id: LeaveRequestId,
        expected: LeaveStatus,
        to: LeaveStatus,
        decision: Option<LeaveDecision>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LeaveRecord>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Stores one user message and its reply, opening the caller's session if needed.
    async fn append_exchange(
        &self,
        user_id: &UserId,
        message: &str,
        response: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Newest `limit` turns, oldest first.
    async fn recent_turns(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError>;
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

/// Name matching shared by the sqlite and in-memory stores. sqlite's `LOWER` only folds ASCII.
pub(crate) fn name_contains(name: &str, fragment: &str) -> bool {
    name.to_ascii_lowercase().contains(&fragment.trim().to_ascii_lowercase())
}

/// `LIKE` pattern for [`name_contains`], to be used with `ESCAPE '\'`.
pub(crate) fn like_pattern(fragment: &str) -> String {
    let mut pattern = String::from("%");
    for ch in fragment.trim().to_ascii_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
