use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use leavedesk_core::domain::leave::{
    parse_date, LeaveDecision, LeaveKind, LeaveRequest, LeaveRequestId, LeaveStatus, LeaveWindow,
    NewLeaveRequest, DATE_FORMAT,
};
use leavedesk_core::domain::user::UserId;

use super::{
    like_pattern, parse_rfc3339, LeaveQuery, LeaveRecord, LeaveRequestRepository, RepositoryError,
};
use crate::DbPool;

const SELECT_RECORD: &str = "SELECT
        lr.id,
        lr.employee_id,
        lr.leave_type,
        lr.start_date,
        lr.end_date,
        lr.half_day,
        lr.reason,
        lr.status,
        lr.approved_by,
        lr.approved_at,
        lr.comment,
        lr.created_at,
        lr.updated_at,
        u.username AS employee_name,
        u.email AS employee_email
     FROM leave_requests lr
     JOIN users u ON u.id = lr.employee_id";

pub struct SqlLeaveRequestRepository {
    pool: DbPool,
}

impl SqlLeaveRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeaveRequestRepository for SqlLeaveRequestRepository {
    async fn insert(
        &self,
        request: NewLeaveRequest,
        created_at: DateTime<Utc>,
    ) -> Result<LeaveRequest, RepositoryError> {
        let timestamp = created_at.to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO leave_requests (
                employee_id,
                leave_type,
                start_date,
                end_date,
                half_day,
                reason,
                status,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.employee_id.0)
        .bind(request.kind.as_str())
        .bind(request.window.start().format(DATE_FORMAT).to_string())
        .bind(request.window.end().format(DATE_FORMAT).to_string())
        .bind(request.half_day)
        .bind(&request.reason)
        .bind(LeaveStatus::Pending.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        Ok(LeaveRequest {
            id: LeaveRequestId(result.last_insert_rowid()),
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
        })
    }

    async fn find_by_id(&self, id: LeaveRequestId) -> Result<Option<LeaveRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_RECORD} WHERE lr.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn query(&self, query: &LeaveQuery) -> Result<Vec<LeaveRecord>, RepositoryError> {
        if query.employee_ids.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_RECORD);
        builder.push(" WHERE 1 = 1");

        if let Some(id) = query.request_id {
            builder.push(" AND lr.id = ").push_bind(id.0);
        }
        if let Some(ids) = &query.employee_ids {
            builder.push(" AND lr.employee_id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(id.0.clone());
            }
            separated.push_unseparated(")");
        }
        if let Some(name) = &query.employee_name {
            builder
                .push(" AND LOWER(u.username) LIKE ")
                .push_bind(like_pattern(name))
                .push(" ESCAPE '\\'");
        }
        if !query.statuses.is_empty() {
            builder.push(" AND lr.status IN (");
            let mut separated = builder.separated(", ");
            for status in &query.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(date) = query.start_on_or_after {
            builder.push(" AND lr.start_date >= ").push_bind(date.format(DATE_FORMAT).to_string());
        }
        if let Some(date) = query.start_on_or_before {
            builder.push(" AND lr.start_date <= ").push_bind(date.format(DATE_FORMAT).to_string());
        }
        if let Some(date) = query.end_on_or_after {
            builder.push(" AND lr.end_date >= ").push_bind(date.format(DATE_FORMAT).to_string());
        }
        if let Some(date) = query.end_on_or_before {
            builder.push(" AND lr.end_date <= ").push_bind(date.format(DATE_FORMAT).to_string());
        }
        if let Some((from, to)) = query.overlapping {
            builder
                .push(" AND lr.start_date <= ")
                .push_bind(to.format(DATE_FORMAT).to_string())
                .push(" AND lr.end_date >= ")
                .push_bind(from.format(DATE_FORMAT).to_string());
        }

        builder.push(" ORDER BY lr.start_date ASC, lr.id ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn transition_status(
        &self,
        id: LeaveRequestId,
        expected: LeaveStatus,
        to: LeaveStatus,
        decision: Option<LeaveDecision>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LeaveRecord>, RepositoryError> {
        // Single statement so the write lock is taken before the status is compared.
        let changed: Option<i64> = match &decision {
            Some(decision) => {
                sqlx::query_scalar(
                    "UPDATE leave_requests
                     SET status = ?, approved_by = ?, approved_at = ?, comment = ?, updated_at = ?
                     WHERE id = ? AND status = ?
                     RETURNING id",
                )
                .bind(to.as_str())
                .bind(decision.decided_by.as_ref().map(|user| user.0.as_str()))
                .bind(decision.decided_at.to_rfc3339())
                .bind(decision.comment.as_deref())
                .bind(updated_at.to_rfc3339())
                .bind(id.0)
                .bind(expected.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "UPDATE leave_requests SET status = ?, updated_at = ?
                     WHERE id = ? AND status = ?
                     RETURNING id",
                )
                .bind(to.as_str())
                .bind(updated_at.to_rfc3339())
                .bind(id.0)
                .bind(expected.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        if changed.is_none() {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}

fn record_from_row(row: &SqliteRow) -> Result<LeaveRecord, RepositoryError> {
    let kind_raw: String = row.try_get("leave_type")?;
    let kind = kind_raw
        .parse::<LeaveKind>()
        .map_err(|_| RepositoryError::Decode(format!("invalid leave type: {kind_raw}")))?;
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<LeaveStatus>()
        .map_err(|_| RepositoryError::Decode(format!("invalid leave status: {status_raw}")))?;

    let start: String = row.try_get("start_date")?;
    let end: String = row.try_get("end_date")?;
    let window = parse_date(&start)
        .and_then(|start| parse_date(&end).and_then(|end| LeaveWindow::new(start, end)))
        .map_err(|err| RepositoryError::Decode(format!("invalid leave window: {err}")))?;

    let approved_at = row
        .try_get::<Option<String>, _>("approved_at")?
        .map(|value| parse_rfc3339("approved_at", &value))
        .transpose()?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(LeaveRecord {
        request: LeaveRequest {
            id: LeaveRequestId(row.try_get("id")?),
            employee_id: UserId(row.try_get("employee_id")?),
            kind,
            window,
            half_day: row.try_get("half_day")?,
            reason: row.try_get("reason")?,
            status,
            approved_by: row.try_get::<Option<String>, _>("approved_by")?.map(UserId),
            approved_at,
            comment: row.try_get("comment")?,
            created_at: parse_rfc3339("created_at", &created_at)?,
            updated_at: parse_rfc3339("updated_at", &updated_at)?,
        },
        employee_name: row.try_get("employee_name")?,
        employee_email: row.try_get("employee_email")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use leavedesk_core::domain::leave::{
        LeaveDecision, LeaveKind, LeaveStatus, LeaveWindow, NewLeaveRequest,
    };
    use leavedesk_core::domain::user::{Role, User, UserId};

    use super::SqlLeaveRequestRepository;
    use crate::repositories::{
        LeaveQuery, LeaveRequestRepository, SqlUserRepository, UserRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_users(&pool).await;
        pool
    }

    async fn seed_users(pool: &DbPool) {
        let users = SqlUserRepository::new(pool.clone());
        for (id, name, role) in [
            ("U-1", "John Smith", Role::Employee),
            ("U-2", "John Doe", Role::Employee),
            ("H-1", "Hana", Role::Hr),
        ] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    username: name.to_string(),
                    email: format!("{}@example.com", id.to_lowercase()),
                    phone: None,
                    role,
                    manager_id: None,
                })
                .await
                .expect("save user");
        }
    }

    fn new_request(employee: &str, start: &str, end: &str) -> NewLeaveRequest {
        NewLeaveRequest {
            employee_id: UserId(employee.to_string()),
            kind: LeaveKind::Annual,
            window: LeaveWindow::parse(start, end).expect("window"),
            half_day: false,
            reason: "vacation".to_string(),
        }
    }

    #[tokio::test]
    async fn inserted_requests_are_pending_and_joined_with_owner() {
        let repo = SqlLeaveRequestRepository::new(pool().await);
        let created = repo
            .insert(new_request("U-1", "2024-05-15", "2024-05-18"), Utc::now())
            .await
            .expect("insert");

        assert_eq!(created.status, LeaveStatus::Pending);
        let record = repo.find_by_id(created.id).await.expect("find").expect("exists");
        assert_eq!(record.employee_name, "John Smith");
        assert_eq!(record.employee_email, "u-1@example.com");
        assert_eq!(record.request.duration_days(), 4.0);
    }

    #[tokio::test]
    async fn query_filters_by_name_status_and_dates_in_start_order() {
        let repo = SqlLeaveRequestRepository::new(pool().await);
        let late = repo
            .insert(new_request("U-1", "2024-08-01", "2024-08-02"), Utc::now())
            .await
            .expect("insert");
        let early = repo
            .insert(new_request("U-2", "2024-06-01", "2024-06-03"), Utc::now())
            .await
            .expect("insert");
        repo
            .insert(new_request("H-1", "2024-07-01", "2024-07-01"), Utc::now())
            .await
            .expect("insert");

        let johns = repo
            .query(&LeaveQuery { employee_name: Some("JOHN".to_string()), ..LeaveQuery::default() })
            .await
            .expect("query");
        assert_eq!(johns.iter().map(|r| r.request.id).collect::<Vec<_>>(), vec![early.id, late.id]);

        let july = repo
            .query(&LeaveQuery {
                overlapping: Some((
                    NaiveDate::from_ymd_opt(2024, 7, 1).expect("date"),
                    NaiveDate::from_ymd_opt(2024, 7, 31).expect("date"),
                )),
                ..LeaveQuery::default()
            })
            .await
            .expect("query");
        assert_eq!(july.len(), 1);
        assert_eq!(july[0].employee_name, "Hana");

        let approved = repo
            .query(&LeaveQuery::default().with_statuses([LeaveStatus::Approved]))
            .await
            .expect("query");
        assert!(approved.is_empty());

        let none = repo
            .query(&LeaveQuery { employee_ids: Some(Vec::new()), ..LeaveQuery::default() })
            .await
            .expect("query");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn transition_stamps_decision_and_refuses_stale_expectation() {
        let repo = SqlLeaveRequestRepository::new(pool().await);
        let created = repo
            .insert(new_request("U-1", "2024-05-15", "2024-05-18"), Utc::now())
            .await
            .expect("insert");
        let decision = LeaveDecision {
            decided_by: Some(UserId("H-1".to_string())),
            comment: Some("Enjoy".to_string()),
            decided_at: Utc::now(),
        };

        let approved = repo
            .transition_status(
                created.id,
                LeaveStatus::Pending,
                LeaveStatus::Approved,
                Some(decision.clone()),
                Utc::now(),
            )
            .await
            .expect("transition")
            .expect("applied");
        assert_eq!(approved.request.status, LeaveStatus::Approved);
        assert_eq!(approved.request.approved_by, Some(UserId("H-1".to_string())));
        assert_eq!(approved.request.comment.as_deref(), Some("Enjoy"));
        assert!(approved.request.approved_at.is_some());

        let second = repo
            .transition_status(
                created.id,
                LeaveStatus::Pending,
                LeaveStatus::Approved,
                Some(decision),
                Utc::now(),
            )
            .await
            .expect("transition");
        assert!(second.is_none(), "a row that is no longer pending cannot be approved again");
    }

    #[tokio::test]
    async fn concurrent_approvals_on_a_shared_file_have_one_winner_per_row() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let pool = connect_with_settings(&url, 8, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_users(&pool).await;
        let repo = std::sync::Arc::new(SqlLeaveRequestRepository::new(pool));

        let mut ids = Vec::new();
        for day in 1..=10 {
            let date = format!("2024-09-{day:02}");
            let created =
                repo.insert(new_request("U-1", &date, &date), Utc::now()).await.expect("insert");
            ids.push(created.id);
        }

        let mut attempts = tokio::task::JoinSet::new();
        for id in &ids {
            for _ in 0..4 {
                let repo = repo.clone();
                let id = *id;
                attempts.spawn(async move {
                    let outcome = repo
                        .transition_status(
                            id,
                            LeaveStatus::Pending,
                            LeaveStatus::Approved,
                            None,
                            Utc::now(),
                        )
                        .await;
                    (id, outcome)
                });
            }
        }

        let mut wins = std::collections::HashMap::new();
        while let Some(joined) = attempts.join_next().await {
            let (id, outcome) = joined.expect("task");
            let applied = outcome.expect("losers are told the row moved, not handed a lock error");
            if applied.is_some() {
                *wins.entry(id).or_insert(0) += 1;
            }
        }

        for id in ids {
            assert_eq!(wins.get(&id), Some(&1), "request {id} should be approved exactly once");
            let record = repo.find_by_id(id).await.expect("find").expect("exists");
            assert_eq!(record.request.status, LeaveStatus::Approved);
        }
    }

    #[tokio::test]
    async fn name_filters_treat_wildcards_literally() {
        let pool = pool().await;
        SqlUserRepository::new(pool.clone())
            .save(User {
                id: UserId("U-9".to_string()),
                username: "Ann_Lee".to_string(),
                email: "ann@example.com".to_string(),
                phone: None,
                role: Role::Employee,
                manager_id: None,
            })
            .await
            .expect("save user");
        let repo = SqlLeaveRequestRepository::new(pool);
        repo
            .insert(new_request("U-9", "2024-06-01", "2024-06-01"), Utc::now())
            .await
            .expect("insert");
        repo
            .insert(new_request("U-1", "2024-06-02", "2024-06-02"), Utc::now())
            .await
            .expect("insert");

        let by_underscore = repo
            .query(&LeaveQuery { employee_name: Some("n_l".to_string()), ..LeaveQuery::default() })
            .await
            .expect("query");
        assert_eq!(by_underscore.len(), 1);
        assert_eq!(by_underscore[0].employee_name, "Ann_Lee");

        let by_percent = repo
            .query(&LeaveQuery { employee_name: Some("%".to_string()), ..LeaveQuery::default() })
            .await
            .expect("query");
        assert!(by_percent.is_empty());
    }
}
