//! HTTP server for the activity dashboard.
//!
//! - `GET /data`: aggregate statistics, optionally `?window=all|<secs>|<n>s|m|h|d`
//! - `GET /traffic`: active dashboard sessions
//! - `GET /health`: liveness plus flush statistics
//!
//! Every response carries a `session_id` cookie. Requests without a known
//! cookie get a fresh session.

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{
        header::{COOKIE, SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::aggregate::{AggregationService, TimeWindow};
use crate::collector::types::PointerButton;
use crate::config::{Config, ConfigError, ServerSettings};
use crate::pipeline::{CumulativeDistance, FlushStats, FlushStatsSnapshot, Pipeline};
use crate::session::{SessionTracker, TrafficReport};
use crate::DISPLAY_TIME_FORMAT;

pub const SESSION_COOKIE: &str = "session_id";

/// Shared server state
pub struct AppState {
    pub aggregates: AggregationService,
    pub sessions: Arc<SessionTracker>,
    pub flush_stats: Arc<FlushStats>,
    pub cumulative: Arc<CumulativeDistance>,
    /// Window applied when a request names none
    pub default_window: Option<Duration>,
}

impl AppState {
    pub fn new(pipeline: &Pipeline, config: &Config) -> Self {
        Self {
            aggregates: AggregationService::from_config(pipeline.store.clone(), config),
            sessions: Arc::new(SessionTracker::new(config.session_ttl)),
            flush_stats: pipeline.stats.clone(),
            cumulative: pipeline.cumulative.clone(),
            default_window: config.default_window,
        }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Request-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Config(ConfigError::InvalidWindow(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_WINDOW")
            }
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub window: Option<String>,
}

/// Body of `GET /data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse {
    pub clicks_left: u64,
    pub clicks_right: u64,
    pub clicks_middle: u64,
    pub gamepad_actions: u64,
    /// Inches moved in the window, rounded to whole inches
    pub mouse_movement: f64,
    pub key_presses: u64,
    #[serde(rename = "__current_time__")]
    pub current_time: String,
    #[serde(rename = "__logging_since__")]
    pub logging_since: Option<String>,
    /// Log size in KB
    #[serde(rename = "__logging_size__")]
    pub logging_size: f64,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Cumulative persisted pointer distance, in inches
    pub total_distance: f64,
    pub flush: FlushStatsSnapshot,
}

/// GET /data
async fn data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
) -> Result<Json<DataResponse>, ApiError> {
    let window = match query.window.as_deref() {
        Some(raw) => TimeWindow::parse(raw)?.as_duration(),
        None => state.default_window,
    };

    let snapshot = state.aggregates.snapshot(window).await;

    Ok(Json(DataResponse {
        clicks_left: snapshot.clicks(PointerButton::Left),
        clicks_right: snapshot.clicks(PointerButton::Right),
        clicks_middle: snapshot.clicks(PointerButton::Middle),
        gamepad_actions: snapshot.gamepad_actions(),
        mouse_movement: snapshot.total_distance.round(),
        key_presses: snapshot.key_presses(),
        current_time: Local::now().format(DISPLAY_TIME_FORMAT).to_string(),
        logging_since: snapshot
            .logging_since
            .map(|t| t.format(DISPLAY_TIME_FORMAT).to_string()),
        logging_size: snapshot.store_size_bytes as f64 / 1024.0,
    }))
}

/// GET /traffic
async fn traffic(State(state): State<Arc<AppState>>) -> Json<TrafficReport> {
    Json(state.sessions.report())
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        total_distance: state.cumulative.get(),
        flush: state.flush_stats.snapshot(),
    })
}

/// The `session_id` value from the request cookies, if any.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
}

/// Touch the caller's session before the handler runs and hand back its cookie.
async fn track_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let cookie = session_cookie(headers);
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let session_id = state.sessions.touch(cookie.as_deref(), &ip, &user_agent);

    let mut response = next.run(request).await;
    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Build the dashboard router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/data", get(data))
        .route("/traffic", get(traffic))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), track_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    settings: &ServerSettings,
    state: Arc<AppState>,
) -> anyhow::Result<(SocketAddr, oneshot::Sender<()>)> {
    let app = build_router(state);

    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Dashboard server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            tracing::info!("Server shutdown signal received");
        })
        .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{now_secs, Position, RawEvent};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(dir: &TempDir) -> (Arc<AppState>, Pipeline) {
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        let pipeline = Pipeline::open(&config).unwrap();
        (Arc::new(AppState::new(&pipeline, &config)), pipeline)
    }

    async fn get_json(
        app: Router,
        uri: &str,
        cookie: Option<&str>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let mut request = HttpRequest::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn set_cookie_id(headers: &HeaderMap) -> String {
        let value = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        value
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("session_id="))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_data_counts_clicks_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (state, pipeline) = test_state(&dir);

        let now = now_secs();
        let at = Position::new(0.0, 0.0);
        pipeline.queue.enqueue(RawEvent::click(now - 2.0, PointerButton::Left, at, true));
        pipeline.queue.enqueue(RawEvent::click(now - 1.5, PointerButton::Left, at, true));
        pipeline.queue.enqueue(RawEvent::key(now - 1.0, true));
        pipeline.queue.enqueue(RawEvent::moved(now - 0.5, Position::new(100.0, 0.0), 2.6));
        pipeline.flush_worker().flush_once().unwrap();

        let (status, headers, body) = get_json(build_router(state), "/data", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(SET_COOKIE).is_some());
        assert_eq!(body["clicks_left"], 2);
        assert_eq!(body["clicks_right"], 0);
        assert_eq!(body["clicks_middle"], 0);
        assert_eq!(body["gamepad_actions"], 0);
        assert_eq!(body["key_presses"], 1);
        assert_eq!(body["mouse_movement"], 3.0);
        assert!(body["__logging_size__"].as_f64().unwrap() > 0.0);
        let current = body["__current_time__"].as_str().unwrap();
        assert!(current.ends_with("AM") || current.ends_with("PM"));
    }

    #[tokio::test]
    async fn test_invalid_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _pipeline) = test_state(&dir);

        let (status, _, body) =
            get_json(build_router(state.clone()), "/data?window=soon", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_WINDOW");

        // Other requests are unaffected.
        let (status, _, _) = get_json(build_router(state), "/data?window=all", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_cookie_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _pipeline) = test_state(&dir);

        let (_, headers, _) = get_json(build_router(state.clone()), "/traffic", None).await;
        let id = set_cookie_id(&headers);

        let cookie = format!("theme=dark; session_id={id}");
        let (_, headers, body) =
            get_json(build_router(state.clone()), "/traffic", Some(&cookie)).await;
        assert_eq!(set_cookie_id(&headers), id);
        assert_eq!(body["users"], 1);
        assert!(body["user_data"][&id]["timestamp"].is_string());

        // A forged id is replaced, not adopted.
        let (_, headers, body) =
            get_json(build_router(state), "/traffic", Some("session_id=forged")).await;
        let minted = set_cookie_id(&headers);
        assert_ne!(minted, "forged");
        assert_eq!(body["users"], 2);
    }

    #[tokio::test]
    async fn test_health_reports_flush_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (state, pipeline) = test_state(&dir);
        pipeline.queue.enqueue(RawEvent::key(now_secs(), true));
        pipeline.flush_worker().flush_once().unwrap();

        let (status, _, body) = get_json(build_router(state), "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["flush"]["events_written"], 1);
        assert_eq!(body["flush"]["batches_written"], 1);
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; session_id=abc ; b=2"));
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("my_session_id=zzz"));
        assert_eq!(session_cookie(&headers), None);
    }
}
