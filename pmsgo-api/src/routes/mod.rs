/// API route handlers
///
/// - `health`: liveness and dependency status
/// - `auth`: signup and signin
/// - `otp`: one-time codes and password reset
/// - `users`: the caller's profile
/// - `tasks`: task CRUD and status summary
/// - `socket`: WebSocket task events

pub mod auth;
pub mod health;
pub mod otp;
pub mod socket;
pub mod tasks;
pub mod users;

use serde::{Deserialize, Serialize};

/// `{"data": ...}` wrapper used by most responses
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{"message": ...}` acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
