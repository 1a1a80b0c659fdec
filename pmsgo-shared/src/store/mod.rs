/// Persistence boundary
///
/// Services (signup, signin, OTP, task handlers) talk to storage only through
/// the traits defined here. Two implementations ship with the crate:
///
/// - [`PgStore`]: Postgres via sqlx, used by the server binary
/// - [`MemoryStore`]: process-local, used by tests and local development
///
/// # Example
///
/// ```no_run
/// use pmsgo_shared::store::{AccountStore, MemoryStore};
///
/// # async fn example() -> Result<(), pmsgo_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// assert!(!store.email_exists("a@x.com").await?);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Account, AccountChanges, AccountType, NewAccount, NewOtp, NewTask, OtpRecord, OtpStatus,
    StatusCount, Task, TaskChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with the unique email constraint
    #[error("email already registered")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Whether any account already uses this (normalized) email
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    /// Inserts an account; fails with [`StoreError::DuplicateEmail`] on collision
    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Accounts matching email and type, at most `limit` of them
    ///
    /// Signin asks for two so that an ambiguous match can be detected.
    async fn find_accounts_for_signin(
        &self,
        email: &str,
        account_type: AccountType,
        limit: i64,
    ) -> Result<Vec<Account>, StoreError>;

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn update_account(
        &self,
        id: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, StoreError>;

    /// Replaces the password hash; returns false if no account has this email
    async fn set_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;
}

/// Task persistence, always scoped to an owner
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, owner_id: Uuid, task: NewTask) -> Result<Task, StoreError>;

    async fn find_task(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Owner's tasks, newest first, optionally filtered by exact status
    async fn list_tasks(
        &self,
        owner_id: Uuid,
        status: Option<&str>,
    ) -> Result<Vec<Task>, StoreError>;

    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StoreError>;

    async fn delete_task(&self, id: Uuid, owner_id: Uuid) -> Result<bool, StoreError>;

    /// Task counts grouped by status, ordered by status
    async fn count_tasks_by_status(&self, owner_id: Uuid) -> Result<Vec<StatusCount>, StoreError>;
}

/// One-time code persistence
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert_otp(&self, otp: NewOtp) -> Result<OtpRecord, StoreError>;

    /// Flags every pending code for `email` as expired; returns how many
    async fn expire_pending(&self, email: &str) -> Result<u64, StoreError>;

    /// Atomically moves the matching, unexpired code from `from` to `to`
    ///
    /// Returns the updated record, or `None` if no code matched.
    async fn transition_otp(
        &self,
        email: &str,
        code_hash: &str,
        from: OtpStatus,
        to: OtpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError>;

    /// Latest code for `email` with this hash, in any status
    async fn find_otp(&self, email: &str, code_hash: &str)
        -> Result<Option<OtpRecord>, StoreError>;

    /// Counts a wrong guess against the email's latest live code
    ///
    /// A live code is pending or used and unexpired. Once its attempts reach
    /// `max_attempts` it is flagged expired in the same update. Returns the
    /// updated record, or `None` if the email has no live code.
    async fn record_failed_attempt(
        &self,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError>;

    /// Deletes every code that can no longer be used: past expiry,
    /// superseded, locked or consumed
    async fn delete_stale_otps(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Everything the API needs from a backend
#[async_trait]
pub trait Store: AccountStore + TaskStore + OtpStore {
    /// Cheap liveness check
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for health output
    fn backend(&self) -> &'static str;
}
