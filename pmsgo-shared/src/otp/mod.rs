/// One-time codes for password recovery
///
/// A code is a 6-digit number drawn from the OS CSPRNG, valid for five
/// minutes by default. Only its SHA-256 digest is stored. Issuing a new code
/// expires every older pending code for the same email.
///
/// # Lifecycle
///
/// ```text
/// request ─▶ Pending ─verify─▶ Used ─reset_password─▶ Consumed
/// ```
///
/// Each transition is one conditional store update, so a code verifies at
/// most once even under concurrent requests. Wrong guesses count against
/// the email's live code, which is locked after `max_attempts` of them.
/// [`spawn_sweeper`] deletes codes that can no longer be used.
///
/// # Example
///
/// ```no_run
/// use pmsgo_shared::otp::{OtpPolicy, OtpService};
/// use pmsgo_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), pmsgo_shared::otp::OtpError> {
/// let store = MemoryStore::new();
/// let otp = OtpService::new(&store, OtpPolicy::default());
///
/// let issued = otp.request("a@x.com").await?;
/// otp.verify("a@x.com", &issued.code).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::password::{hash_password_async, validate_password_length, PasswordError};
use crate::models::account::normalize_email;
use crate::models::{NewOtp, OtpStatus};
use crate::store::{AccountStore, OtpStore, StoreError};

/// Code length, lifetime and guess budget
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub digits: u32,
    pub ttl: Duration,

    /// Wrong guesses tolerated before the live code is locked
    pub max_attempts: i32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            digits: 6,
            ttl: Duration::minutes(5),
            max_attempts: 5,
        }
    }
}

impl OtpPolicy {
    pub fn with_ttl_secs(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid code")]
    InvalidCode,

    #[error("Code expired")]
    Expired,

    #[error("{0}")]
    InvalidPassword(String),

    #[error("Account not found")]
    AccountNotFound,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly issued code, returned once for delivery
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Hex SHA-256 of a code
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Draws a zero-padded numeric code
pub fn generate_code(digits: u32) -> String {
    let upper = 10u64.pow(digits);
    let value = OsRng.gen_range(0..upper);
    format!("{:0width$}", value, width = digits as usize)
}

/// Issues, verifies and consumes codes against a store
pub struct OtpService<'a, S: ?Sized> {
    store: &'a S,
    policy: OtpPolicy,
}

impl<'a, S> OtpService<'a, S>
where
    S: OtpStore + ?Sized,
{
    pub fn new(store: &'a S, policy: OtpPolicy) -> Self {
        Self { store, policy }
    }

    fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.policy.digits as usize && code.bytes().all(|b| b.is_ascii_digit())
    }

    /// Issues a new code, superseding any pending one
    pub async fn request(&self, email: &str) -> Result<IssuedOtp, OtpError> {
        let email = normalize_email(email);

        let superseded = self.store.expire_pending(&email).await?;
        if superseded > 0 {
            tracing::debug!(superseded, "Expired older pending codes");
        }

        let code = generate_code(self.policy.digits);
        let expires_at = Utc::now() + self.policy.ttl;

        let record = self
            .store
            .insert_otp(NewOtp {
                email: email.clone(),
                code_hash: hash_code(&code),
                expires_at,
            })
            .await?;

        tracing::info!(otp_id = %record.id, "One-time code issued");

        Ok(IssuedOtp {
            email,
            code,
            expires_at,
        })
    }

    /// Marks a pending code as used; succeeds once per code
    pub async fn verify(&self, email: &str, code: &str) -> Result<(), OtpError> {
        self.transition(email, code, OtpStatus::Pending, OtpStatus::Used)
            .await
    }

    /// Spends a verified code
    pub async fn consume(&self, email: &str, code: &str) -> Result<(), OtpError> {
        self.transition(email, code, OtpStatus::Used, OtpStatus::Consumed)
            .await
    }

    async fn transition(
        &self,
        email: &str,
        code: &str,
        from: OtpStatus,
        to: OtpStatus,
    ) -> Result<(), OtpError> {
        let code = code.trim();
        if !self.is_well_formed(code) {
            return Err(OtpError::InvalidCode);
        }

        let email = normalize_email(email);
        let code_hash = hash_code(code);
        let now = Utc::now();

        if self
            .store
            .transition_otp(&email, &code_hash, from, to, now)
            .await?
            .is_some()
        {
            return Ok(());
        }

        // Distinguish a stale code from a wrong one
        match self.store.find_otp(&email, &code_hash).await? {
            Some(record) if record.status == from && record.is_expired_at(now) => {
                Err(OtpError::Expired)
            }
            Some(_) => Err(OtpError::InvalidCode),
            None => {
                self.count_wrong_guess(&email, now).await?;
                Err(OtpError::InvalidCode)
            }
        }
    }

    async fn count_wrong_guess(&self, email: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let record = self
            .store
            .record_failed_attempt(email, self.policy.max_attempts, now)
            .await?;

        if let Some(record) = record.filter(|r| r.status == OtpStatus::Expired) {
            tracing::warn!(
                otp_id = %record.id,
                attempts = record.attempts,
                "One-time code locked after repeated wrong guesses"
            );
        }

        Ok(())
    }

    /// Deletes codes that can no longer be used
    pub async fn sweep(&self) -> Result<u64, OtpError> {
        Ok(self.store.delete_stale_otps(Utc::now()).await?)
    }
}

impl<'a, S> OtpService<'a, S>
where
    S: OtpStore + AccountStore + ?Sized,
{
    /// Sets a new password using a verified code
    ///
    /// The code is spent only once the account is known to exist and the new
    /// hash is ready, so a failure before that point leaves it usable.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), OtpError> {
        validate_password_length(new_password).map_err(OtpError::InvalidPassword)?;

        let email = normalize_email(email);
        if self.store.find_account_by_email(&email).await?.is_none() {
            return Err(OtpError::AccountNotFound);
        }

        let password_hash = hash_password_async(new_password.trim().to_string()).await?;

        self.consume(&email, code).await?;

        if !self
            .store
            .set_password_by_email(&email, &password_hash)
            .await?
        {
            return Err(OtpError::AccountNotFound);
        }

        tracing::info!("Password reset completed");
        Ok(())
    }
}

/// Periodically deletes stale codes until `store` is dropped
pub fn spawn_sweeper<S>(store: &Arc<S>, period: std::time::Duration) -> JoinHandle<()>
where
    S: OtpStore + ?Sized + 'static,
{
    let weak = Arc::downgrade(store);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                break;
            };

            match OtpService::new(store.as_ref(), OtpPolicy::default()).sweep().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept stale one-time codes"),
                Err(e) => tracing::warn!(error = %e, "One-time code sweep failed"),
            }
        }
    })
}
