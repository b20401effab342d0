use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_USER_IDS: &[&str] =
    &["usr-hr-001", "usr-mgr-001", "usr-emp-001", "usr-emp-002", "usr-emp-003"];

const SEED_LEAVE_REQUEST_IDS: &[i64] = &[1, 2, 3, 4, 5];

/// Deterministic demo organisation used by `leavedesk seed` and end-to-end checks.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: SEED_USER_IDS.len(),
            leave_requests_seeded: SEED_LEAVE_REQUEST_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let users: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM users WHERE id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("users", users == SEED_USER_IDS.len() as i64));

        let requests: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM leave_requests WHERE id IN ({})",
            SEED_LEAVE_REQUEST_IDS.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("leave-requests", requests == SEED_LEAVE_REQUEST_IDS.len() as i64));

        let reports: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE manager_id = 'usr-mgr-001'")
                .fetch_one(pool)
                .await?;
        checks.push(("manager-reports", reports == 3));

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM chat_sessions WHERE user_id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM leave_requests WHERE employee_id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM users WHERE id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub leave_requests_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::DemoDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn load_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = DemoDataset::load(&pool).await.expect("first load");
        DemoDataset::load(&pool).await.expect("second load");
        assert_eq!(first.users_seeded, 5);

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);

        DemoDataset::clean(&pool).await.expect("clean");
        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
    }
}
