/// Persistent records for PMSGo
///
/// These are plain data types. Reading and writing them goes through the
/// traits in [`crate::store`], which have a Postgres and an in-memory
/// implementation.
///
/// # Models
///
/// - `account`: Company/member accounts and their safe profile projection
/// - `task`: Tasks owned by an account
/// - `otp`: One-time codes used for password recovery

pub mod account;
pub mod otp;
pub mod task;

pub use account::{Account, AccountChanges, AccountProfile, AccountType, NewAccount};
pub use otp::{NewOtp, OtpRecord, OtpStatus};
pub use task::{NewTask, StatusCount, Task, TaskChanges, DEFAULT_TASK_STATUS};
