/// Database plumbing
///
/// - `pool`: Postgres pool creation and health check
/// - `migrations`: embedded schema migrations
///
/// Queries themselves live in [`crate::store::PgStore`].

pub mod migrations;
pub mod pool;
