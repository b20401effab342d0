use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use leavedesk_core::domain::user::{Role, User, UserId};

use super::{like_pattern, RepositoryError, UserRepository};
use crate::DbPool;

const USER_COLUMNS: &str = "id, username, email, phone, role, manager_id";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_contact(&self, handle: &str) -> Result<Option<User>, RepositoryError> {
        let handle = handle.trim();
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE LOWER(email) = LOWER(?) OR phone = ?
             ORDER BY id ASC
             LIMIT 1"
        ))
        .bind(handle)
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn search_by_name(&self, fragment: &str) -> Result<Vec<User>, RepositoryError> {
        let pattern = like_pattern(fragment);
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE LOWER(username) LIKE ? ESCAPE '\\'
             ORDER BY username ASC, id ASC"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn list_direct_reports(&self, manager_id: &UserId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE manager_id = ?
             ORDER BY username ASC, id ASC"
        ))
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, phone, role, manager_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                phone = excluded.phone,
                role = excluded.role,
                manager_id = excluded.manager_id",
        )
        .bind(&user.id.0)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.phone.as_deref())
        .bind(user.role.as_str())
        .bind(user.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = role_raw
        .parse::<Role>()
        .map_err(|_| RepositoryError::Decode(format!("invalid user role: {role_raw}")))?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        role,
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(UserId),
    })
}

#[cfg(test)]
mod tests {
    use leavedesk_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    fn user(id: &str, name: &str, role: Role, manager: Option<&str>) -> User {
        User {
            id: UserId(id.to_string()),
            username: name.to_string(),
            email: format!("{}@example.com", id.to_lowercase()),
            phone: None,
            role,
            manager_id: manager.map(|value| UserId(value.to_string())),
        }
    }

    async fn repo() -> SqlUserRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUserRepository::new(pool)
    }

    #[tokio::test]
    async fn users_are_found_by_id_contact_and_name_fragment() {
        let repo = repo().await;
        let mut john = user("U-1", "John Smith", Role::Employee, None);
        john.phone = Some("+15550100".to_string());
        repo.save(john.clone()).await.expect("save");
        repo.save(user("U-2", "Johnny Doe", Role::Employee, None)).await.expect("save");
        repo.save(user("U-3", "Jane Roe", Role::Hr, None)).await.expect("save");

        assert_eq!(repo.find_by_id(&john.id).await.expect("find"), Some(john.clone()));
        assert_eq!(repo.find_by_contact("+15550100").await.expect("phone"), Some(john.clone()));
        assert_eq!(repo.find_by_contact("U-1@EXAMPLE.com").await.expect("email"), Some(john));

        let johns = repo.search_by_name("JOHN").await.expect("search");
        assert_eq!(johns.iter().map(|u| u.id.0.as_str()).collect::<Vec<_>>(), ["U-1", "U-2"]);
        assert_eq!(repo.count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn direct_reports_follow_the_manager_reference() {
        let repo = repo().await;
        repo.save(user("M-1", "Morgan", Role::Manager, None)).await.expect("save");
        repo.save(user("U-1", "Ada", Role::Employee, Some("M-1"))).await.expect("save");
        repo.save(user("U-2", "Bo", Role::Employee, None)).await.expect("save");

        let reports = repo
            .list_direct_reports(&UserId("M-1".to_string()))
            .await
            .expect("reports");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].username, "Ada");
    }
}
