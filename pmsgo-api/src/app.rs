/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use pmsgo_api::{app::AppState, config::Config};
/// use pmsgo_shared::store::MemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(MemoryStore::new()), config);
/// let app = pmsgo_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::{ApiError, ErrorResponse},
    middleware::{
        rate_limit::{rate_limit_layer, RateLimiter},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pmsgo_shared::auth::middleware::jwt_auth_middleware;
use pmsgo_shared::realtime::RealtimeGateway;
use pmsgo_shared::redis::RedisClient;
use pmsgo_shared::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned into every handler; all fields are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub realtime: RealtimeGateway,

    /// Present when `REDIS_URL` is set; only used for health reporting
    pub redis: Option<RedisClient>,

    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State with a local-only real-time gateway
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));

        Self {
            store,
            config: Arc::new(config),
            realtime: RealtimeGateway::local(),
            redis: None,
            rate_limiter,
        }
    }

    /// Replaces the gateway with one mirrored through Redis
    pub fn with_realtime(mut self, gateway: RealtimeGateway, redis: RedisClient) -> Self {
        self.realtime = gateway;
        self.redis = Some(redis);
        self
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health
/// ├── GET /socket?token=               # WebSocket, authenticates itself
/// └── /api/v1/
///     ├── /auth/                       # public
///     │   ├── POST /signup
///     │   └── POST /signin
///     ├── /otp/                        # public
///     │   ├── POST /request
///     │   ├── POST /verify
///     │   └── POST /reset-password
///     ├── /users/                      # bearer token
///     │   ├── GET   /me
///     │   └── PATCH /me
///     └── /tasks/                      # bearer token
///         ├── POST   /
///         ├── GET    /?status=
///         ├── GET    /summary
///         ├── GET    /:id
///         ├── PATCH  /:id
///         └── DELETE /:id
/// ```
///
/// # Middleware Stack
///
/// Outermost first: tracing, security headers, CORS, compression, body
/// limit, rate limiting, then per-router authentication.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/signin", post(routes::auth::signin));

    let otp_routes = Router::new()
        .route("/request", post(routes::otp::request_code))
        .route("/verify", post(routes::otp::verify_code))
        .route("/reset-password", post(routes::otp::reset_password));

    let user_routes = Router::new()
        .route(
            "/me",
            get(routes::users::get_me).patch(routes::users::update_me),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let task_routes = Router::new()
        .route(
            "/",
            post(routes::tasks::create_task).get(routes::tasks::list_tasks),
        )
        .route("/summary", get(routes::tasks::task_summary))
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/otp", otp_routes)
        .nest("/users", user_routes)
        .nest("/tasks", task_routes);

    let body_limit = state.config.api.body_limit_bytes;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/socket", get(routes::socket::socket_handler))
        .nest("/api/v1", v1_routes)
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_layer,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// JSON 404 for unmatched routes
async fn not_found(uri: Uri) -> Response {
    let body = ErrorResponse::new(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("{} not found", uri.path()),
    );

    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Bearer token gate for protected routers
///
/// Rejections are rendered in the API error format.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = state.jwt_secret().to_string();
    Ok(jwt_auth_middleware(secret, req, next).await?)
}
