/// Account model
///
/// An account is the credential record a user signs in with. Signup creates
/// `company` accounts; the `account_type` column is the discriminator that
/// scopes signin lookups.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY,
///     name VARCHAR(255) NOT NULL,
///     email VARCHAR(320) NOT NULL,
///     workspace_name VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     account_type VARCHAR(32) NOT NULL DEFAULT 'company',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT accounts_email_key UNIQUE (email)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Workspace owner created through signup
    Company,

    /// Account invited into a company workspace
    Member,
}

impl AccountType {
    /// Column value for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Company => "company",
            AccountType::Member => "member",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(AccountType::Company),
            "member" => Ok(AccountType::Member),
            other => Err(format!("unknown account type: {}", other)),
        }
    }
}

impl TryFrom<String> for AccountType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Stored account, including the password hash
///
/// Never serialize this to clients; use [`AccountProfile`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,

    /// Trimmed, lowercased, unique
    pub email: String,

    pub workspace_name: String,

    /// Argon2id PHC string
    pub password_hash: String,

    #[sqlx(try_from = "String")]
    pub account_type: AccountType,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Safe projection handed to clients and embedded in tokens
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            account_type: self.account_type,
        }
    }
}

/// The `{id, name, email, type}` projection of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(rename = "type")]
    pub account_type: AccountType,
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub workspace_name: String,
    pub password_hash: String,
    pub account_type: AccountType,
}

/// Profile fields an account may change about itself
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub workspace_name: Option<String>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.workspace_name.is_none()
    }
}

/// Normalizes an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_round_trip() {
        assert_eq!("company".parse::<AccountType>(), Ok(AccountType::Company));
        assert_eq!("member".parse::<AccountType>(), Ok(AccountType::Member));
        assert!("admin".parse::<AccountType>().is_err());
        assert_eq!(AccountType::Company.to_string(), "company");
    }

    #[test]
    fn test_profile_serializes_type_without_password() {
        let account = Account {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            email: "a@x.com".to_string(),
            workspace_name: "Acme HQ".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            account_type: AccountType::Company,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(account.profile()).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 4);
        assert_eq!(json["type"], "company");
        assert_eq!(json["name"], "Acme");
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn test_account_changes_is_empty() {
        assert!(AccountChanges::default().is_empty());
        let changes = AccountChanges {
            name: Some("New".to_string()),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
