/// Configuration management for the API server
///
/// Settings are read once at startup from the process environment (after
/// loading `.env` if present) and never change afterwards.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `APP_HOST`: bind host (default: 0.0.0.0)
/// - `APP_PORT`: bind port (default: 8080)
/// - `JWT_SECRET`: token signing secret, at least 32 characters (required)
/// - `CLIENT_URL`: comma-separated allowed CORS origins, `*` for any (default: *)
/// - `REDIS_URL`: enables cross-instance real-time events (optional)
/// - `REALTIME_CHANNEL`: pub/sub channel (default: pmsgo:realtime)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `BODY_LIMIT_BYTES`: request body cap (default: 50 MiB)
/// - `RATE_LIMIT_WINDOW_SECS`: rate limit window (default: 900)
/// - `RATE_LIMIT_MAX_REQUESTS`: requests per window and client (default: 3000)
/// - `TRUSTED_PROXY_HOPS`: reverse proxies in front of the server whose
///   `X-Forwarded-For` entries are trusted (default: 0, peer address only)
/// - `OTP_TTL_SECS`: one-time code lifetime (default: 300)
/// - `LOG_FORMAT`: `pretty` or `json` (default: pretty)
///
/// # Example
///
/// ```no_run
/// use pmsgo_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Listening on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use config::Environment;
use pmsgo_shared::db::pool::DatabaseConfig;
use pmsgo_shared::realtime::DEFAULT_CHANNEL;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

const MIN_JWT_SECRET_LEN: usize = 32;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseSettings,
    pub jwt: JwtConfig,
    pub redis: RedisSettings,
    pub rate_limit: RateLimitConfig,
    pub otp: OtpConfig,
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `["*"]` means any
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,

    pub body_limit_bytes: usize,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// `None` keeps real-time events on this instance
    pub url: Option<String>,
    pub channel: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,

    /// Number of trusted proxies appending to `X-Forwarded-For`
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct OtpConfig {
    pub ttl_secs: i64,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Flat view of the environment, keys lowercased
#[derive(Debug, Deserialize)]
struct RawSettings {
    database_url: String,
    database_max_connections: u32,
    app_host: String,
    app_port: u16,
    jwt_secret: String,
    client_url: String,
    redis_url: Option<String>,
    realtime_channel: String,
    production: bool,
    body_limit_bytes: usize,
    rate_limit_window_secs: u64,
    rate_limit_max_requests: u32,
    trusted_proxy_hops: usize,
    otp_ttl_secs: i64,
    log_format: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::default())
    }

    /// Reads configuration from an explicit variable map instead of the process
    /// environment
    pub fn from_vars<I, K, V>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self::from_environment(Environment::default().source(Some(map)))
    }

    fn from_environment(environment: Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("database_max_connections", 10)?
            .set_default("app_host", "0.0.0.0")?
            .set_default("app_port", 8080)?
            .set_default("client_url", "*")?
            .set_default("realtime_channel", DEFAULT_CHANNEL)?
            .set_default("production", false)?
            .set_default("body_limit_bytes", 50 * 1024 * 1024)?
            .set_default("rate_limit_window_secs", 900)?
            .set_default("rate_limit_max_requests", 3000)?
            .set_default("trusted_proxy_hops", 0)?
            .set_default("otp_ttl_secs", 300)?
            .set_default("log_format", "pretty")?
            .add_source(environment.try_parsing(true))
            .build()?;

        let raw: RawSettings = settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> anyhow::Result<Self> {
        if raw.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL environment variable is required");
        }

        if raw.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LEN
            );
        }

        if raw.rate_limit_window_secs == 0 || raw.rate_limit_max_requests == 0 {
            anyhow::bail!("Rate limit window and request count must be positive");
        }

        if raw.otp_ttl_secs <= 0 {
            anyhow::bail!("OTP_TTL_SECS must be positive");
        }

        let cors_origins: Vec<String> = raw
            .client_url
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            api: ApiConfig {
                host: raw.app_host,
                port: raw.app_port,
                cors_origins: if cors_origins.is_empty() {
                    vec!["*".to_string()]
                } else {
                    cors_origins
                },
                production: raw.production,
                body_limit_bytes: raw.body_limit_bytes,
                log_format: raw.log_format.parse()?,
            },
            database: DatabaseSettings {
                url: raw.database_url,
                max_connections: raw.database_max_connections,
            },
            jwt: JwtConfig {
                secret: raw.jwt_secret,
            },
            redis: RedisSettings {
                url: raw.redis_url.filter(|url| !url.trim().is_empty()),
                channel: raw.realtime_channel,
            },
            rate_limit: RateLimitConfig {
                window_secs: raw.rate_limit_window_secs,
                max_requests: raw.rate_limit_max_requests,
                trusted_proxy_hops: raw.trusted_proxy_hops,
            },
            otp: OtpConfig {
                ttl_secs: raw.otp_ttl_secs,
            },
        })
    }

    /// `host:port` to bind the listener to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Pool settings for [`pmsgo_shared::db::pool::create_pool`]
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            ..Default::default()
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgresql://localhost/pmsgo"),
            ("JWT_SECRET", SECRET),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(minimal()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.database.max_connections, 10);
        assert!(config.allows_any_origin());
        assert!(!config.api.production);
        assert_eq!(config.api.body_limit_bytes, 50 * 1024 * 1024);
        assert_eq!(config.api.log_format, LogFormat::Pretty);
        assert_eq!(config.redis.url, None);
        assert_eq!(config.redis.channel, "pmsgo:realtime");
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.rate_limit.max_requests, 3000);
        assert_eq!(config.rate_limit.trusted_proxy_hops, 0);
        assert_eq!(config.otp.ttl_secs, 300);
    }

    #[test]
    fn test_overrides() {
        let mut vars = minimal();
        vars.extend([
            ("APP_PORT", "9000"),
            ("CLIENT_URL", "https://app.example.com/, http://localhost:3000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("PRODUCTION", "true"),
            ("LOG_FORMAT", "json"),
            ("TRUSTED_PROXY_HOPS", "1"),
        ]);

        let config = Config::from_vars(vars).unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(
            config.api.cors_origins,
            vec!["https://app.example.com", "http://localhost:3000"]
        );
        assert!(!config.allows_any_origin());
        assert_eq!(config.redis.url.as_deref(), Some("redis://cache:6379"));
        assert!(config.api.production);
        assert_eq!(config.api.log_format, LogFormat::Json);
        assert_eq!(config.rate_limit.trusted_proxy_hops, 1);
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result = Config::from_vars([("JWT_SECRET", SECRET)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_jwt_secret_fails() {
        let result = Config::from_vars([
            ("DATABASE_URL", "postgresql://localhost/pmsgo"),
            ("JWT_SECRET", "short"),
        ]);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("JWT_SECRET"));
    }

    #[test]
    fn test_invalid_port_fails() {
        let mut vars = minimal();
        vars.push(("APP_PORT", "not-a-port"));
        assert!(Config::from_vars(vars).is_err());
    }

    #[test]
    fn test_empty_redis_url_is_none() {
        let mut vars = minimal();
        vars.push(("REDIS_URL", ""));
        assert_eq!(Config::from_vars(vars).unwrap().redis.url, None);
    }
}
