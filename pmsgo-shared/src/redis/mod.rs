/// Redis integration
///
/// Redis is optional. When configured, it carries the real-time pub/sub
/// channel that mirrors socket events across server instances (see
/// [`crate::realtime`]).
///
/// # Example
///
/// ```no_run
/// use pmsgo_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), pmsgo_shared::redis::RedisClientError> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// client.ping().await?;
/// # Ok(())
/// # }
/// ```

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
