use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leavedesk_core::domain::conversation::ConversationTurn;
use leavedesk_core::domain::leave::{
    LeaveDecision, LeaveRequest, LeaveRequestId, LeaveStatus, NewLeaveRequest,
};
use leavedesk_core::domain::user::{User, UserId};

use super::{
    name_contains, ConversationRepository, LeaveQuery, LeaveRecord, LeaveRequestRepository,
    RepositoryError, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|user| (user.id.0.clone(), user)).collect()),
        }
    }

    async fn sorted_by_name<F>(&self, predicate: F) -> Vec<User>
    where
        F: Fn(&User) -> bool,
    {
        let users = self.users.read().await;
        let mut matched: Vec<User> =
            users.values().filter(|user| predicate(user)).cloned().collect();
        matched.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.id.cmp(&b.id)));
        matched
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_contact(&self, handle: &str) -> Result<Option<User>, RepositoryError> {
        let handle = handle.trim();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| {
                user.email.eq_ignore_ascii_case(handle) || user.phone.as_deref() == Some(handle)
            })
            .cloned())
    }

    async fn search_by_name(&self, fragment: &str) -> Result<Vec<User>, RepositoryError> {
        Ok(self.sorted_by_name(|user| name_contains(&user.username, fragment)).await)
    }

    async fn list_direct_reports(&self, manager_id: &UserId) -> Result<Vec<User>, RepositoryError> {
        Ok(self.sorted_by_name(|user| user.manager_id.as_ref() == Some(manager_id)).await)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
struct LeaveTable {
    next_id: i64,
    rows: BTreeMap<i64, LeaveRequest>,
}

/// Leave store joined against an in-memory user table for owner names.
pub struct InMemoryLeaveRequestRepository {
    users: Arc<InMemoryUserRepository>,
    table: RwLock<LeaveTable>,
}

impl InMemoryLeaveRequestRepository {
    pub fn new(users: Arc<InMemoryUserRepository>) -> Self {
        Self { users, table: RwLock::new(LeaveTable::default()) }
    }

    /// Inserts a record as-is, e.g. an already decided request for a test fixture.
    pub async fn seed(&self, request: LeaveRequest) {
        let mut table = self.table.write().await;
        table.next_id = table.next_id.max(request.id.0);
        table.rows.insert(request.id.0, request);
    }

    async fn join(&self, request: LeaveRequest) -> LeaveRecord {
        let users = self.users.users.read().await;
        let (employee_name, employee_email) = users
            .get(&request.employee_id.0)
            .map(|user| (user.username.clone(), user.email.clone()))
            .unwrap_or_else(|| (request.employee_id.0.clone(), String::new()));
        LeaveRecord { request, employee_name, employee_email }
    }
}

#[async_trait::async_trait]
impl LeaveRequestRepository for InMemoryLeaveRequestRepository {
    async fn insert(
        &self,
        request: NewLeaveRequest,
        created_at: DateTime<Utc>,
    ) -> Result<LeaveRequest, RepositoryError> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let created = LeaveRequest {
            id: LeaveRequestId(table.next_id),
            employee_id: request.employee_id,
            kind: request.kind,
            window: request.window,
            half_day: request.half_day,
            reason: request.reason,
            status: LeaveStatus::Pending,
            approved_by: None,
            approved_at: None,
            comment: None,
            created_at,
            updated_at: created_at,
        };
        table.rows.insert(created.id.0, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: LeaveRequestId) -> Result<Option<LeaveRecord>, RepositoryError> {
        let found = self.table.read().await.rows.get(&id.0).cloned();
        match found {
            Some(request) => Ok(Some(self.join(request).await)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: &LeaveQuery) -> Result<Vec<LeaveRecord>, RepositoryError> {
        let rows: Vec<LeaveRequest> = self.table.read().await.rows.values().cloned().collect();

        let mut records = Vec::new();
        for request in rows {
            let record = self.join(request).await;
            if query.matches(&record) {
                records.push(record);
            }
        }
        records.sort_by_key(|record| (record.request.window.start(), record.request.id));
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn transition_status(
        &self,
        id: LeaveRequestId,
        expected: LeaveStatus,
        to: LeaveStatus,
        decision: Option<LeaveDecision>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LeaveRecord>, RepositoryError> {
        let updated = {
            let mut table = self.table.write().await;
            let Some(row) = table.rows.get_mut(&id.0) else {
                return Ok(None);
            };
            if row.status != expected {
                return Ok(None);
            }
            row.status = to;
            row.updated_at = updated_at;
            if let Some(decision) = decision {
                row.approved_by = decision.decided_by;
                row.approved_at = Some(decision.decided_at);
                row.comment = decision.comment;
            }
            row.clone()
        };
        Ok(Some(self.join(updated).await))
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn append_exchange(
        &self,
        user_id: &UserId,
        message: &str,
        response: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        let session = turns.entry(user_id.0.clone()).or_default();
        session.push(ConversationTurn::user(message, at));
        session.push(ConversationTurn::assistant(response, at));
        Ok(())
    }

    async fn recent_turns(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let turns = self.turns.read().await;
        let session = turns.get(&user_id.0).map(Vec::as_slice).unwrap_or_default();
        let start = session.len().saturating_sub(limit);
        Ok(session[start..].to_vec())
    }
}
