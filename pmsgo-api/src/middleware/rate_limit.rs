/// Per-client rate limiting
///
/// Token bucket per client address, held in memory. A bucket starts full
/// with `max_requests` tokens and refills continuously so that a full
/// bucket is restored over one window (3000 requests per 15 minutes by
/// default).
///
/// Clients are keyed by the peer address. Behind reverse proxies, set
/// `trusted_proxy_hops` to the number of proxies: the key is then the
/// right-most `X-Forwarded-For` entry not written by the client itself.
/// The header is ignored otherwise.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: tokens left after this request
/// - `X-RateLimit-Reset`: seconds until the bucket is full again
/// - `Retry-After`: seconds to wait (429 responses only)
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use pmsgo_api::config::RateLimitConfig;
/// use pmsgo_api::middleware::rate_limit::{rate_limit_layer, RateLimiter};
/// use std::sync::Arc;
///
/// let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
///     window_secs: 900,
///     max_requests: 3000,
///     trusted_proxy_hops: 0,
/// }));
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(limiter, rate_limit_layer));
/// ```

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket state for one client
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, rate: f64) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }

    fn seconds_until_full(&self, rate: f64, capacity: u32) -> u64 {
        ((capacity as f64 - self.tokens).max(0.0) / rate).ceil() as u64
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,

    /// Seconds until the bucket is full
    pub reset_after: u64,

    /// Seconds until the next request would pass; 0 when allowed
    pub retry_after: u64,
}

/// In-memory token buckets keyed by client
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn refill_rate(&self) -> f64 {
        self.config.max_requests as f64 / self.config.window_secs as f64
    }

    /// Takes one token for `client` if available
    pub fn check(&self, client: &str) -> RateLimitDecision {
        let now = Instant::now();
        let capacity = self.config.max_requests;
        let rate = self.refill_rate();

        let mut bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::full(capacity, now));

        bucket.refill(rate, capacity, now);
        let allowed = bucket.try_consume();

        RateLimitDecision {
            allowed,
            limit: capacity,
            remaining: bucket.tokens.floor() as u32,
            reset_after: bucket.seconds_until_full(rate, capacity),
            retry_after: if allowed {
                0
            } else {
                bucket.seconds_until_available(rate).max(1)
            },
        }
    }

    /// Drops buckets that have refilled completely
    ///
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let capacity = self.config.max_requests;
        let rate = self.refill_rate();
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| {
            bucket.refill(rate, capacity, now);
            bucket.tokens < capacity as f64
        });

        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Identifies the caller of `request`
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_key(headers, peer, self.config.trusted_proxy_hops)
    }
}

/// Identifies the caller for rate limiting
///
/// With `trusted_hops == 0` only the peer address counts. Otherwise the
/// entry `trusted_hops` positions from the right of `X-Forwarded-For` is
/// used; entries left of it are client-controlled and never read. A chain
/// shorter than expected falls back to the peer.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_hops: usize) -> String {
    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    let forwarded = match trusted_hops {
        0 => None,
        n => hops
            .len()
            .checked_sub(n)
            .map(|i| hops[i])
            .filter(|hop| !hop.is_empty())
            .map(str::to_string),
    };

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn insert_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_after));
}

/// Rate limiting middleware
///
/// # Errors
///
/// - 429 Too Many Requests: bucket empty
pub async fn rate_limit_layer(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = limiter.client_key(request.headers(), peer);

    let decision = limiter.check(&client);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, retry_after = decision.retry_after, "Rate limit exceeded");
        ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: format!(
                "Too many requests. Try again in {} seconds",
                decision.retry_after
            ),
        }
        .into_response()
    };

    insert_headers(response.headers_mut(), &decision);
    response
}

/// Periodically drops idle buckets until the limiter is no longer shared
pub fn spawn_pruner(limiter: &Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(limiter);
    let period = limiter.window();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };

            let removed = limiter.prune();
            if removed > 0 {
                tracing::debug!(removed, remaining = limiter.tracked_clients(), "Pruned rate limit buckets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_secs,
            max_requests,
            trusted_proxy_hops: 0,
        })
    }

    #[test]
    fn test_token_bucket_consume() {
        let now = Instant::now();
        let mut bucket = TokenBucket::full(2, now);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        assert_eq!(bucket.tokens, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_exhausts_then_refills() {
        let limiter = limiter(3, 3);

        for remaining in [2, 1, 0] {
            let decision = limiter.check("10.0.0.1");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }

        let denied = limiter.check("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check("10.0.0.1").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_have_separate_buckets() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_full_buckets() {
        let limiter = limiter(2, 10);
        limiter.check("a");
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.prune(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.prune(), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_key_ignores_forwarded_for_without_proxies() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();

        assert_eq!(client_key(&headers, Some(peer), 0), "192.168.1.5");
        assert_eq!(client_key(&headers, None, 0), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_key(&headers, Some(peer), 0), "192.168.1.5");
    }

    #[test]
    fn test_client_key_takes_rightmost_untrusted_hop() {
        let peer: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        // Client spoofed the first entry; the proxy appended the real address
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 203.0.113.7"),
        );

        assert_eq!(client_key(&headers, Some(peer), 1), "203.0.113.7");
        assert_eq!(client_key(&headers, Some(peer), 2), "1.2.3.4");
        assert_eq!(client_key(&headers, Some(peer), 3), "10.0.0.2");
        assert_eq!(client_key(&HeaderMap::new(), Some(peer), 1), "10.0.0.2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spoofed_forwarded_for_shares_peer_bucket() {
        let limiter = Arc::new(limiter(2, 900));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter.clone(), rate_limit_layer));
        let peer: SocketAddr = "198.51.100.9:5000".parse().unwrap();

        let mut allowed = 0;
        for i in 0..20 {
            let request = Request::builder()
                .uri("/")
                .header("x-forwarded-for", format!("203.0.113.{}", i))
                .extension(ConnectInfo(peer))
                .body(Body::empty())
                .unwrap();
            if app.clone().oneshot(request).await.unwrap().status() == StatusCode::OK {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 2);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_middleware_returns_429_with_headers() {
        let limiter = Arc::new(limiter(1, 60));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_layer));

        let request = || Request::builder().uri("/").body(Body::empty()).unwrap();

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["X-RateLimit-Limit"], "1");
        assert_eq!(first.headers()["X-RateLimit-Remaining"], "0");

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["Retry-After"], "60");
    }
}
