//! # PMSGo Shared Library
//!
//! Domain types and services used by the PMSGo API server.
//!
//! ## Module Organization
//!
//! - `models`: accounts, tasks and one-time codes
//! - `store`: persistence traits with Postgres and in-memory backends
//! - `auth`: password hashing, tokens, signup, signin and the bearer gate
//! - `otp`: one-time codes for password recovery
//! - `validation`: field-level validation errors
//! - `db`: Postgres pool and migrations
//! - `redis`: Redis client
//! - `realtime`: socket fan-out mirrored over Redis pub/sub

pub mod auth;
pub mod db;
pub mod models;
pub mod otp;
pub mod realtime;
pub mod redis;
pub mod store;
pub mod validation;

/// Current version of the PMSGo shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
