/// Middleware modules for the API server
///
/// - `security`: browser hardening headers on every response
/// - `rate_limit`: per-client token bucket

pub mod rate_limit;
pub mod security;
