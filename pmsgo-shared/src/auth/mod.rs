/// Authentication for PMSGo
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and verification
/// - [`jwt`]: 24-hour HS256 session tokens
/// - [`middleware`]: bearer-token gate and [`middleware::AuthContext`]
/// - [`signup`]: uniqueness-then-schema validation and account creation
/// - [`signin`]: credential lookup, verification and token issuance
///
/// # Example
///
/// ```no_run
/// use pmsgo_shared::auth::signin::{signin, SigninRequest};
/// use pmsgo_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let request = SigninRequest {
///     email: "a@x.com".to_string(),
///     password: "secret1".to_string(),
///     account_type: "company".to_string(),
/// };
/// let response = signin(&store, request, "a-secret-that-is-at-least-32-bytes!").await?;
/// println!("{}", response.token);
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod signin;
pub mod signup;
