use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratewatch_core::aggregate::{AggregatedResponse, Aggregator};
use ratewatch_core::domain::{SourceKey, SourceReport, Ticker, TickerError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ratewatch_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let aggregator = Aggregator::from_settings(&settings).inspect_err(|e| {
        sentry_anyhow::capture_anyhow(e);
    })?;
    tracing::info!(
        sources = ?aggregator.keys(),
        timeout = ?aggregator.timeout(),
        rate_limit_per_minute = ?settings.rate_limit_per_minute,
        secure_headers = settings.secure_headers,
        "aggregator ready"
    );

    let state = AppState::new(aggregator, settings.rate_limit_per_minute);
    let app = app(state, settings.secure_headers);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline';",
    ),
];

/// Health stays outside the rate limit; the ratings routes share one quota.
fn app(state: AppState, secure_headers: bool) -> Router {
    let ratings = Router::new()
        .route("/get_ratings", post(get_ratings))
        .route("/ratings/:ticker", get(ratings_for))
        .route("/ratings/:ticker/:source", get(rating_from_source))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let mut router = Router::new()
        .route("/health", get(health))
        .merge(ratings)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if secure_headers {
        for (name, value) in SECURITY_HEADERS {
            router = router.layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ));
        }
    }
    router
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
struct AppState {
    aggregator: Arc<Aggregator>,
    limiter: Option<Arc<Limiter>>,
}

impl AppState {
    fn new(aggregator: Aggregator, per_minute: Option<u32>) -> Self {
        let limiter = per_minute
            .and_then(NonZeroU32::new)
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));
        Self {
            aggregator: Arc::new(aggregator),
            limiter,
        }
    }
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(req).await
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now(),
        version: std::env::var("APP_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
    })
}

/// Client-side mistakes, rendered as `{"error": ...}`.
#[derive(Debug)]
enum ApiError {
    BadTicker(TickerError),
    UnknownSource(String),
    BadBody(JsonRejection),
    RateLimited,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadTicker(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::UnknownSource(s) => (StatusCode::NOT_FOUND, format!("Unknown source: {s}")),
            ApiError::BadBody(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<TickerError> for ApiError {
    fn from(e: TickerError) -> Self {
        ApiError::BadTicker(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadBody(rejection)
    }
}

#[derive(Debug, Deserialize)]
struct RatingsRequest {
    #[serde(default)]
    ticker: String,
}

async fn get_ratings(
    State(state): State<AppState>,
    payload: Result<Json<RatingsRequest>, JsonRejection>,
) -> Result<Json<AggregatedResponse>, ApiError> {
    let Json(body) = payload?;
    let ticker = Ticker::parse(&body.ticker)?;
    Ok(Json(state.aggregator.collect(&ticker).await))
}

async fn ratings_for(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<AggregatedResponse>, ApiError> {
    let ticker = Ticker::parse(&ticker)?;
    Ok(Json(state.aggregator.collect(&ticker).await))
}

async fn rating_from_source(
    State(state): State<AppState>,
    Path((ticker, source)): Path<(String, String)>,
) -> Result<Json<SourceReport>, ApiError> {
    let ticker = Ticker::parse(&ticker)?;
    let key: SourceKey = source
        .parse()
        .map_err(|_| ApiError::UnknownSource(source.clone()))?;
    state
        .aggregator
        .collect_one(key, &ticker)
        .await
        .map(Json)
        .ok_or(ApiError::UnknownSource(source))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &ratewatch_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
