/// Company signup
///
/// Validation runs in a fixed order: the email uniqueness lookup first, then
/// the body schema. A body that is both a duplicate and otherwise invalid
/// therefore reports only "Email must be unique".
///
/// The store's unique constraint backs the lookup, so two concurrent
/// signups with the same email still produce one account and one
/// `EmailTaken` error.

use serde::Deserialize;
use validator::Validate;

use super::password::{hash_password_async, PasswordError};
use crate::models::account::normalize_email;
use crate::models::{AccountProfile, AccountType, NewAccount};
use crate::store::{AccountStore, StoreError};
use crate::validation::{field_errors, FieldError};

/// Message reported for a registered email
pub const EMAIL_TAKEN_MESSAGE: &str = "Email must be unique";

/// Signup body as received; every field may be missing
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(
        required(message = "Name is required"),
        length(min = 1, max = 255, message = "Name must be 1-255 characters")
    )]
    pub name: Option<String>,

    #[validate(
        required(message = "Email is required"),
        email(message = "Email must be a valid email")
    )]
    pub email: Option<String>,

    #[validate(
        required(message = "Workspace name is required"),
        length(min = 1, max = 255, message = "Workspace name must be 1-255 characters")
    )]
    pub workspace_name: Option<String>,

    #[validate(
        required(message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: Option<String>,
}

impl SignupRequest {
    /// Trims every field and lowercases the email
    pub fn normalize(self) -> Self {
        Self {
            name: self.name.map(|v| v.trim().to_string()),
            email: self.email.map(|v| normalize_email(&v)),
            workspace_name: self.workspace_name.map(|v| v.trim().to_string()),
            password: self.password.map(|v| v.trim().to_string()),
        }
    }
}

/// A signup body that passed validation
#[derive(Debug, Clone)]
pub struct ValidSignup {
    pub name: String,
    pub email: String,
    pub workspace_name: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("{}", EMAIL_TAKEN_MESSAGE)]
    EmailTaken,

    #[error("Signup validation failed")]
    Invalid(Vec<FieldError>),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SignupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => SignupError::EmailTaken,
            other => SignupError::Store(other),
        }
    }
}

/// Uniqueness check, then schema check
///
/// Performs at most one store lookup, and only when an email was supplied.
pub async fn validate_signup<S>(store: &S, req: SignupRequest) -> Result<ValidSignup, SignupError>
where
    S: AccountStore + ?Sized,
{
    let req = req.normalize();

    if let Some(email) = req.email.as_deref().filter(|e| !e.is_empty()) {
        if store.email_exists(email).await? {
            return Err(SignupError::EmailTaken);
        }
    }

    req.validate()
        .map_err(|e| SignupError::Invalid(field_errors(&e)))?;

    match (req.name, req.email, req.workspace_name, req.password) {
        (Some(name), Some(email), Some(workspace_name), Some(password)) => Ok(ValidSignup {
            name,
            email,
            workspace_name,
            password,
        }),
        _ => Err(SignupError::Invalid(vec![FieldError::new(
            "body",
            "Missing required fields",
        )])),
    }
}

/// Validates, hashes the password and creates a company account
pub async fn register<S>(store: &S, req: SignupRequest) -> Result<AccountProfile, SignupError>
where
    S: AccountStore + ?Sized,
{
    let signup = validate_signup(store, req).await?;
    let password_hash = hash_password_async(signup.password).await?;

    let account = store
        .insert_account(NewAccount {
            name: signup.name,
            email: signup.email,
            workspace_name: signup.workspace_name,
            password_hash,
            account_type: AccountType::Company,
        })
        .await?;

    tracing::info!(account_id = %account.id, "Company account registered");

    Ok(account.profile())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::store::MemoryStore;

    fn body(name: &str, email: &str, workspace: &str, password: &str) -> SignupRequest {
        SignupRequest {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            workspace_name: Some(workspace.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_creates_company_with_hashed_password() {
        let store = MemoryStore::new();
        let profile = register(&store, body("Acme", " A@X.com ", "Acme HQ", "secret1"))
            .await
            .unwrap();

        assert_eq!(profile.email, "a@x.com");
        assert_eq!(profile.account_type, AccountType::Company);

        let stored = store.find_account(profile.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret1");
        assert!(verify_password("secret1", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_reported_before_schema() {
        let store = MemoryStore::new();
        register(&store, body("Acme", "a@x.com", "Acme HQ", "secret1"))
            .await
            .unwrap();

        // Also schema-invalid: empty name, short password
        let result = validate_signup(&store, body("", "a@x.com", "", "123")).await;
        match result {
            Err(err @ SignupError::EmailTaken) => {
                assert_eq!(err.to_string(), "Email must be unique")
            }
            other => panic!("expected EmailTaken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_password_cites_password_field() {
        let store = MemoryStore::new();
        let result = validate_signup(&store, body("Acme", "a@x.com", "Acme HQ", "12345")).await;

        let Err(SignupError::Invalid(details)) = result else {
            panic!("expected validation error");
        };
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].field, "password");
    }

    #[tokio::test]
    async fn test_password_is_trimmed_before_length_check() {
        let store = MemoryStore::new();
        let result = validate_signup(&store, body("Acme", "a@x.com", "Acme HQ", "  abc  ")).await;
        assert!(matches!(result, Err(SignupError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_missing_fields_listed() {
        let store = MemoryStore::new();
        let result = validate_signup(&store, SignupRequest::default()).await;

        let Err(SignupError::Invalid(details)) = result else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name", "password", "workspace_name"]);
    }

    #[tokio::test]
    async fn test_overlong_names_rejected() {
        let store = MemoryStore::new();
        let long = "x".repeat(256);
        let result = validate_signup(&store, body(&long, "a@x.com", &long, "secret1")).await;

        let Err(SignupError::Invalid(details)) = result else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "workspace_name"]);

        let edge = "x".repeat(255);
        assert!(validate_signup(&store, body(&edge, "a@x.com", &edge, "secret1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let store = MemoryStore::new();
        let result = validate_signup(&store, body("Acme", "not-an-email", "Acme HQ", "secret1")).await;

        let Err(SignupError::Invalid(details)) = result else {
            panic!("expected validation error");
        };
        assert_eq!(details[0].field, "email");
    }

    #[tokio::test]
    async fn test_concurrent_signups_create_one_account() {
        let store = MemoryStore::new();

        let a = register(&store, body("A", "race@x.com", "WS", "secret1"));
        let b = register(&store, body("B", "race@x.com", "WS", "secret1"));
        let (a, b) = tokio::join!(a, b);

        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(SignupError::EmailTaken)
        ));
    }
}
