use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use leavedesk_core::domain::conversation::{ConversationTurn, TurnRole};
use leavedesk_core::domain::user::UserId;

use super::{parse_rfc3339, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn append_exchange(
        &self,
        user_id: &UserId,
        message: &str,
        response: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let timestamp = at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chat_sessions (id, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user_id.0)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;

        let session_id: String =
            sqlx::query_scalar("SELECT id FROM chat_sessions WHERE user_id = ?")
                .bind(&user_id.0)
                .fetch_one(&mut *tx)
                .await?;

        for (role, content) in [(TurnRole::User, message), (TurnRole::Assistant, response)] {
            sqlx::query(
                "INSERT INTO chat_messages (session_id, role, content, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&session_id)
            .bind(role.as_str())
            .bind(content)
            .bind(&timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT m.role, m.content, m.created_at
             FROM chat_messages m
             JOIN chat_sessions s ON s.id = m.session_id
             WHERE s.user_id = ?
             ORDER BY m.id DESC
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .iter()
            .map(|row| -> Result<ConversationTurn, RepositoryError> {
                let role_raw: String = row.try_get("role")?;
                let role = role_raw.parse::<TurnRole>().map_err(|_| {
                    RepositoryError::Decode(format!("invalid turn role: {role_raw}"))
                })?;
                let created_at: String = row.try_get("created_at")?;
                Ok(ConversationTurn {
                    role,
                    content: row.try_get("content")?,
                    recorded_at: parse_rfc3339("created_at", &created_at)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        turns.reverse();
        Ok(turns)
    }
}
