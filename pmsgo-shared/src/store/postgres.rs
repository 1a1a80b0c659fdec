/// Postgres-backed store
///
/// Every query names its columns explicitly and binds parameters; no SQL is
/// built from user input.

use super::{AccountStore, OtpStore, Store, StoreError, TaskStore};
use crate::models::{
    Account, AccountChanges, AccountType, NewAccount, NewOtp, NewTask, OtpRecord, OtpStatus,
    StatusCount, Task, TaskChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, name, email, workspace_name, password_hash, account_type, created_at, updated_at";

const TASK_COLUMNS: &str = "id, owner_id, title, description, status, created_at, updated_at";

const OTP_COLUMNS: &str = "id, email, code_hash, status, attempts, created_at, expires_at";

/// Store backed by a sqlx connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let query = format!(
            r#"
            INSERT INTO accounts (id, name, email, workspace_name, password_hash, account_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(Uuid::new_v4())
            .bind(account.name)
            .bind(account.email)
            .bind(account.workspace_name)
            .bind(account.password_hash)
            .bind(account.account_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)
    }

    async fn find_accounts_for_signin(
        &self,
        email: &str,
        account_type: AccountType,
        limit: i64,
    ) -> Result<Vec<Account>, StoreError> {
        let query = format!(
            "SELECT {} FROM accounts WHERE email = $1 AND account_type = $2 LIMIT $3",
            ACCOUNT_COLUMNS
        );

        let accounts = sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .bind(account_type.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(accounts)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);

        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {} FROM accounts WHERE email = $1", ACCOUNT_COLUMNS);

        let account = sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn update_account(
        &self,
        id: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($2, name),
                workspace_name = COALESCE($3, workspace_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );

        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(changes.name)
            .bind(changes.workspace_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn set_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE email = $1",
        )
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, owner_id: Uuid, task: NewTask) -> Result<Task, StoreError> {
        let query = format!(
            r#"
            INSERT INTO tasks (id, owner_id, title, description, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        let task = sqlx::query_as::<_, Task>(&query)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(task.title)
            .bind(task.description)
            .bind(task.status)
            .fetch_one(&self.pool)
            .await?;

        Ok(task)
    }

    async fn find_task(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Task>, StoreError> {
        let query = format!(
            "SELECT {} FROM tasks WHERE id = $1 AND owner_id = $2",
            TASK_COLUMNS
        );

        let task = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(task)
    }

    async fn list_tasks(
        &self,
        owner_id: Uuid,
        status: Option<&str>,
    ) -> Result<Vec<Task>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM tasks
            WHERE owner_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#,
            TASK_COLUMNS
        );

        let tasks = sqlx::query_as::<_, Task>(&query)
            .bind(owner_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StoreError> {
        let query = format!(
            r#"
            UPDATE tasks
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        let task = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.status)
            .fetch_optional(&self.pool)
            .await?;

        Ok(task)
    }

    async fn delete_task(&self, id: Uuid, owner_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_tasks_by_status(&self, owner_id: Uuid) -> Result<Vec<StatusCount>, StoreError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM tasks
            WHERE owner_id = $1
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn insert_otp(&self, otp: NewOtp) -> Result<OtpRecord, StoreError> {
        let query = format!(
            r#"
            INSERT INTO otp_codes (id, email, code_hash, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            OTP_COLUMNS
        );

        let record = sqlx::query_as::<_, OtpRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(otp.email)
            .bind(otp.code_hash)
            .bind(OtpStatus::Pending.as_i16())
            .bind(otp.expires_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn expire_pending(&self, email: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE otp_codes SET status = $3 WHERE email = $1 AND status = $2")
            .bind(email)
            .bind(OtpStatus::Pending.as_i16())
            .bind(OtpStatus::Expired.as_i16())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn transition_otp(
        &self,
        email: &str,
        code_hash: &str,
        from: OtpStatus,
        to: OtpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError> {
        // Single statement so two concurrent verifications cannot both win
        let query = format!(
            r#"
            UPDATE otp_codes
            SET status = $4
            WHERE id = (
                SELECT id FROM otp_codes
                WHERE email = $1 AND code_hash = $2 AND status = $3 AND expires_at > $5
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OTP_COLUMNS
        );

        let record = sqlx::query_as::<_, OtpRecord>(&query)
            .bind(email)
            .bind(code_hash)
            .bind(from.as_i16())
            .bind(to.as_i16())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn find_otp(
        &self,
        email: &str,
        code_hash: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM otp_codes
            WHERE email = $1 AND code_hash = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            OTP_COLUMNS
        );

        let record = sqlx::query_as::<_, OtpRecord>(&query)
            .bind(email)
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let query = format!(
            r#"
            UPDATE otp_codes
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= $3 THEN $4 ELSE status END
            WHERE id = (
                SELECT id FROM otp_codes
                WHERE email = $1 AND status = ANY($2) AND expires_at > $5
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE
            )
            RETURNING {}
            "#,
            OTP_COLUMNS
        );

        let live = [OtpStatus::Pending.as_i16(), OtpStatus::Used.as_i16()];

        let record = sqlx::query_as::<_, OtpRecord>(&query)
            .bind(email)
            .bind(&live[..])
            .bind(max_attempts)
            .bind(OtpStatus::Expired.as_i16())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn delete_stale_otps(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM otp_codes WHERE expires_at <= $1 OR NOT (status = ANY($2))",
        )
        .bind(now)
        .bind(&[OtpStatus::Pending.as_i16(), OtpStatus::Used.as_i16()][..])
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
