/// Redis connection handling
///
/// [`RedisClient`] owns a `ConnectionManager` (multiplexed, reconnects on
/// its own) for commands such as `PUBLISH`, and can open dedicated pub/sub
/// connections for subscribers.

use redis::aio::{ConnectionManager, PubSub};
use redis::{Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

/// Connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `redis://[:password@]host:port[/db]`
    pub url: String,

    pub connection_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            command_timeout_secs: 5,
        }
    }
}

/// Cheap-to-clone Redis handle
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects, failing if Redis is unreachable within the timeout
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client.clone()),
        )
        .await
        .map_err(|_| RedisClientError::ConnectionError("Connection timed out".to_string()))?
        .map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");

        Ok(Self {
            client,
            manager,
            config: Arc::new(config),
        })
    }

    /// `PING`, bounded by the command timeout
    pub async fn ping(&self) -> Result<(), RedisClientError> {
        let mut conn = self.manager.clone();

        let pong: String = tokio::time::timeout(
            Duration::from_secs(self.config.command_timeout_secs),
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisClientError::HealthCheckFailed("PING timed out".to_string()))??;

        if pong != "PONG" {
            return Err(RedisClientError::HealthCheckFailed(format!(
                "Unexpected PING reply: {}",
                pong
            )));
        }

        Ok(())
    }

    /// Managed connection for commands
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Opens a new dedicated pub/sub connection
    pub async fn pubsub(&self) -> Result<PubSub, RedisClientError> {
        let conn = self.client.get_async_connection().await?;
        Ok(conn.into_pubsub())
    }

    /// URL with credentials masked, for logs and health output
    pub fn sanitized_url(&self) -> String {
        sanitize_url(&self.config.url)
    }
}

fn sanitize_url(url: &str) -> String {
    if let (Some(scheme_end), Some(at_pos)) = (url.find("://"), url.rfind('@')) {
        if at_pos > scheme_end {
            return format!("{}***@{}", &url[..scheme_end + 3], &url[at_pos + 1..]);
        }
    }
    url.to_string()
}
