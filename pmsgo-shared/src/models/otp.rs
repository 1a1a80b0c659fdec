/// One-time code model
///
/// Codes are never stored in clear text; `code_hash` holds the SHA-256 hex
/// digest. The numeric `status` flag drives the code lifecycle:
///
/// ```text
/// Pending(0) ──verify──▶ Used(1) ──reset──▶ Consumed(3)
///     │                      │
///     └── newer request or too many wrong guesses ──▶ Expired(2)
/// ```

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle flag stored as SMALLINT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OtpStatus {
    /// Issued, not yet verified
    Pending = 0,

    /// Verified, may authorize one password reset
    Used = 1,

    /// Superseded by a newer code, or locked after failed guesses
    Expired = 2,

    /// Spent on a password reset
    Consumed = 3,
}

impl OtpStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for OtpStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OtpStatus::Pending),
            1 => Ok(OtpStatus::Used),
            2 => Ok(OtpStatus::Expired),
            3 => Ok(OtpStatus::Consumed),
            other => Err(format!("unknown otp status: {}", other)),
        }
    }
}

/// A stored code
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,

    #[sqlx(try_from = "i16")]
    pub status: OtpStatus,

    /// Wrong guesses recorded against this code
    pub attempts: i32,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Input for storing a freshly issued code
#[derive(Debug, Clone)]
pub struct NewOtp {
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags_match_column_values() {
        for (flag, status) in [
            (0, OtpStatus::Pending),
            (1, OtpStatus::Used),
            (2, OtpStatus::Expired),
            (3, OtpStatus::Consumed),
        ] {
            assert_eq!(status.as_i16(), flag);
            assert_eq!(OtpStatus::try_from(flag), Ok(status));
        }
        assert!(OtpStatus::try_from(7).is_err());
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let now = Utc::now();
        let record = OtpRecord {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            code_hash: String::new(),
            status: OtpStatus::Pending,
            attempts: 0,
            created_at: now,
            expires_at: now,
        };
        assert!(record.is_expired_at(now));
        assert!(!record.is_expired_at(now - chrono::Duration::seconds(1)));
    }
}
