/// In-memory store
///
/// Keeps every table in a `Vec` behind one `RwLock`. Uniqueness and
/// status transitions are checked under the write lock, so this backend
/// enforces the same invariants as Postgres.

use super::{AccountStore, OtpStore, Store, StoreError, TaskStore};
use crate::models::{
    Account, AccountChanges, AccountType, NewAccount, NewOtp, NewTask, OtpRecord, OtpStatus,
    StatusCount, Task, TaskChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    tasks: Vec<Task>,
    otps: Vec<OtpRecord>,
}

/// Process-local store, cheap to clone
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing rows, bypassing the email constraint
    ///
    /// Used to reproduce legacy data where one email maps to several accounts.
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables {
                accounts,
                ..Default::default()
            })),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.iter().any(|a| a.email == email))
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.accounts.iter().any(|a| a.email == account.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            name: account.name,
            email: account.email,
            workspace_name: account.workspace_name,
            password_hash: account.password_hash,
            account_type: account.account_type,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.push(account.clone());

        Ok(account)
    }

    async fn find_accounts_for_signin(
        &self,
        email: &str,
        account_type: AccountType,
        limit: i64,
    ) -> Result<Vec<Account>, StoreError> {
        let tables = self.tables.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);

        Ok(tables
            .accounts
            .iter()
            .filter(|a| a.email == email && a.account_type == account_type)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn update_account(
        &self,
        id: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(account) = tables.accounts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            account.name = name;
        }
        if let Some(workspace_name) = changes.workspace_name {
            account.workspace_name = workspace_name;
        }
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn set_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut updated = false;

        for account in tables.accounts.iter_mut().filter(|a| a.email == email) {
            account.password_hash = password_hash.to_string();
            account.updated_at = now;
            updated = true;
        }

        Ok(updated)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, owner_id: Uuid, task: NewTask) -> Result<Task, StoreError> {
        let mut tables = self.tables.write().await;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            owner_id,
            title: task.title,
            description: task.description,
            status: task.status,
            created_at: now,
            updated_at: now,
        };
        tables.tasks.push(task.clone());

        Ok(task)
    }

    async fn find_task(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Task>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .iter()
            .find(|t| t.id == id && t.owner_id == owner_id)
            .cloned())
    }

    async fn list_tasks(
        &self,
        owner_id: Uuid,
        status: Option<&str>,
    ) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;

        // Reverse insertion order breaks created_at ties newest-first
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .rev()
            .filter(|t| t.owner_id == owner_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(task) = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.owner_id == owner_id)
        else {
            return Ok(None);
        };

        changes.apply(task, Utc::now());
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: Uuid, owner_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.tasks.len();
        tables
            .tasks
            .retain(|t| !(t.id == id && t.owner_id == owner_id));
        Ok(tables.tasks.len() < before)
    }

    async fn count_tasks_by_status(&self, owner_id: Uuid) -> Result<Vec<StatusCount>, StoreError> {
        let tables = self.tables.read().await;

        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for task in tables.tasks.iter().filter(|t| t.owner_id == owner_id) {
            *counts.entry(task.status.as_str()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount {
                status: status.to_string(),
                count,
            })
            .collect())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn insert_otp(&self, otp: NewOtp) -> Result<OtpRecord, StoreError> {
        let mut tables = self.tables.write().await;

        let record = OtpRecord {
            id: Uuid::new_v4(),
            email: otp.email,
            code_hash: otp.code_hash,
            status: OtpStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            expires_at: otp.expires_at,
        };
        tables.otps.push(record.clone());

        Ok(record)
    }

    async fn expire_pending(&self, email: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut expired = 0;

        for record in tables
            .otps
            .iter_mut()
            .filter(|r| r.email == email && r.status == OtpStatus::Pending)
        {
            record.status = OtpStatus::Expired;
            expired += 1;
        }

        Ok(expired)
    }

    async fn transition_otp(
        &self,
        email: &str,
        code_hash: &str,
        from: OtpStatus,
        to: OtpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let mut tables = self.tables.write().await;

        let candidate = tables.otps.iter_mut().rev().find(|r| {
            r.email == email && r.code_hash == code_hash && r.status == from && !r.is_expired_at(now)
        });

        Ok(candidate.map(|record| {
            record.status = to;
            record.clone()
        }))
    }

    async fn find_otp(
        &self,
        email: &str,
        code_hash: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .otps
            .iter()
            .rev()
            .find(|r| r.email == email && r.code_hash == code_hash)
            .cloned())
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let mut tables = self.tables.write().await;

        let live = tables.otps.iter_mut().rev().find(|r| {
            r.email == email
                && matches!(r.status, OtpStatus::Pending | OtpStatus::Used)
                && !r.is_expired_at(now)
        });

        Ok(live.map(|record| {
            record.attempts += 1;
            if record.attempts >= max_attempts {
                record.status = OtpStatus::Expired;
            }
            record.clone()
        }))
    }

    async fn delete_stale_otps(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.otps.len();

        tables.otps.retain(|r| {
            matches!(r.status, OtpStatus::Pending | OtpStatus::Used) && !r.is_expired_at(now)
        });

        Ok((before - tables.otps.len()) as u64)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            name: "Acme".to_string(),
            email: email.to_string(),
            workspace_name: "Acme HQ".to_string(),
            password_hash: "hash".to_string(),
            account_type: AccountType::Company,
        }
    }

    fn new_task(title: &str, status: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: String::new(),
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store.insert_account(new_account("a@x.com")).await.unwrap();

        let result = store.insert_account(new_account("a@x.com")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
        assert!(store.email_exists("a@x.com").await.unwrap());
        assert!(!store.email_exists("b@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_only_one_wins() {
        let store = MemoryStore::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_account(new_account("race@x.com")).await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_signin_lookup_scoped_by_type_and_limit() {
        let store = MemoryStore::new();
        store.insert_account(new_account("a@x.com")).await.unwrap();

        let company = store
            .find_accounts_for_signin("a@x.com", AccountType::Company, 2)
            .await
            .unwrap();
        assert_eq!(company.len(), 1);

        let member = store
            .find_accounts_for_signin("a@x.com", AccountType::Member, 2)
            .await
            .unwrap();
        assert!(member.is_empty());
    }

    #[tokio::test]
    async fn test_tasks_are_owner_scoped() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let task = store.create_task(alice, new_task("A", "New")).await.unwrap();

        assert!(store.find_task(task.id, bob).await.unwrap().is_none());
        assert!(store
            .update_task(task.id, bob, TaskChanges::default())
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_task(task.id, bob).await.unwrap());
        assert!(store.list_tasks(bob, None).await.unwrap().is_empty());

        assert!(store.delete_task(task.id, alice).await.unwrap());
        assert!(store.find_task(task.id, alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_status_filter() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        store.create_task(owner, new_task("first", "New")).await.unwrap();
        store.create_task(owner, new_task("second", "Completed")).await.unwrap();
        store.create_task(owner, new_task("third", "New")).await.unwrap();

        let all = store.list_tasks(owner, None).await.unwrap();
        let titles: Vec<_> = all.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);

        let new_only = store.list_tasks(owner, Some("New")).await.unwrap();
        assert_eq!(new_only.len(), 2);
        assert!(new_only.iter().all(|t| t.status == "New"));
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        store.create_task(owner, new_task("a", "New")).await.unwrap();
        store.create_task(owner, new_task("b", "New")).await.unwrap();
        store.create_task(owner, new_task("c", "Completed")).await.unwrap();
        store
            .create_task(Uuid::new_v4(), new_task("other", "New"))
            .await
            .unwrap();

        let counts = store.count_tasks_by_status(owner).await.unwrap();
        assert_eq!(
            counts,
            vec![
                StatusCount { status: "Completed".to_string(), count: 1 },
                StatusCount { status: "New".to_string(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_otp_transition_is_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .insert_otp(NewOtp {
                email: "a@x.com".to_string(),
                code_hash: "h".to_string(),
                expires_at: now + chrono::Duration::minutes(5),
            })
            .await
            .unwrap();

        let first = store
            .transition_otp("a@x.com", "h", OtpStatus::Pending, OtpStatus::Used, now)
            .await
            .unwrap();
        assert_eq!(first.map(|r| r.status), Some(OtpStatus::Used));

        let second = store
            .transition_otp("a@x.com", "h", OtpStatus::Pending, OtpStatus::Used, now)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_expire_pending_only_touches_pending() {
        let store = MemoryStore::new();
        let later = Utc::now() + chrono::Duration::minutes(5);

        for hash in ["one", "two"] {
            store
                .insert_otp(NewOtp {
                    email: "a@x.com".to_string(),
                    code_hash: hash.to_string(),
                    expires_at: later,
                })
                .await
                .unwrap();
        }
        store
            .transition_otp("a@x.com", "one", OtpStatus::Pending, OtpStatus::Used, Utc::now())
            .await
            .unwrap();

        assert_eq!(store.expire_pending("a@x.com").await.unwrap(), 1);
        let one = store.find_otp("a@x.com", "one").await.unwrap().unwrap();
        let two = store.find_otp("a@x.com", "two").await.unwrap().unwrap();
        assert_eq!(one.status, OtpStatus::Used);
        assert_eq!(two.status, OtpStatus::Expired);
    }

    #[tokio::test]
    async fn test_failed_attempts_lock_latest_live_code() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .insert_otp(NewOtp {
                email: "a@x.com".to_string(),
                code_hash: "h".to_string(),
                expires_at: now + chrono::Duration::minutes(5),
            })
            .await
            .unwrap();

        for expected in 1..3 {
            let record = store
                .record_failed_attempt("a@x.com", 3, now)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(record.attempts, expected);
            assert_eq!(record.status, OtpStatus::Pending);
        }

        let locked = store
            .record_failed_attempt("a@x.com", 3, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locked.status, OtpStatus::Expired);

        // Nothing live left to count against
        assert!(store
            .record_failed_attempt("a@x.com", 3, now)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .transition_otp("a@x.com", "h", OtpStatus::Pending, OtpStatus::Used, now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_stale_otps_keeps_live_codes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let later = now + chrono::Duration::minutes(5);

        for (hash, expires_at) in [
            ("old", now - chrono::Duration::seconds(1)),
            ("superseded", later),
            ("live", later),
        ] {
            if hash == "live" {
                store.expire_pending("a@x.com").await.unwrap();
            }
            store
                .insert_otp(NewOtp {
                    email: "a@x.com".to_string(),
                    code_hash: hash.to_string(),
                    expires_at,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.delete_stale_otps(now).await.unwrap(), 2);
        assert!(store.find_otp("a@x.com", "old").await.unwrap().is_none());
        assert!(store.find_otp("a@x.com", "superseded").await.unwrap().is_none());
        assert!(store.find_otp("a@x.com", "live").await.unwrap().is_some());
        assert_eq!(store.delete_stale_otps(now).await.unwrap(), 0);
    }
}
