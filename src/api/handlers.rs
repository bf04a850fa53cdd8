use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::contracts::{validate_key, CounterStore, StoreError};

/// Server metrics for monitoring.
#[derive(Default)]
pub struct Metrics {
    pub hits_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub hit_latency_sum_us: AtomicU64,
    pub start_time: std::sync::OnceLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let m = Self::default();
        let _ = m.start_time.set(Instant::now());
        m
    }

    pub fn record_hit(&self, latency_us: u64) {
        self.hits_total.fetch_add(1, Ordering::Relaxed);
        self.hit_latency_sum_us
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Application state shared across handlers.
pub struct AppState<S: CounterStore> {
    pub store: Arc<S>,
    pub metrics: Arc<Metrics>,
    /// Upper bound on a single store call; expiry maps to 503.
    pub store_timeout: Duration,
    /// Key counted by `GET /hits` when no path segment is given.
    pub default_key: String,
}

impl<S: CounterStore> AppState<S> {
    pub fn new(
        store: Arc<S>,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
        default_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            metrics,
            store_timeout,
            default_key: default_key.into(),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type.
#[allow(dead_code)]
pub enum ApiError {
    Store(StoreError),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_response) = match self {
            ApiError::Store(StoreError::InvalidKey(msg)) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: format!("Invalid key: {}", msg),
                    code: "INVALID_KEY".into(),
                },
            ),
            ApiError::Store(StoreError::Unavailable(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: format!("Counter store unavailable: {}", msg),
                    code: "STORE_UNAVAILABLE".into(),
                },
            ),
            ApiError::Store(StoreError::Serialization(msg)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: format!("Stored count is unreadable: {}", msg),
                    code: "DATA_INTEGRITY".into(),
                },
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    code: "BAD_REQUEST".into(),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

/// GET /hits/{path}
/// Atomically increments the visit counter for a path and returns the new
/// total as a plain decimal body.
pub async fn record_hit<S: CounterStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(path): Path<String>,
) -> Result<String, ApiError> {
    increment(&state, &path).await
}

/// GET /hits
/// Increments the counter for the configured default page key.
pub async fn record_default_hit<S: CounterStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<String, ApiError> {
    let key = state.default_key.clone();
    increment(&state, &key).await
}

/// Shared increment path for both hit routes.
///
/// The key is validated before the store is touched, so a blank key leaves
/// the store unmutated. The store call runs on the blocking pool and is
/// bounded by the configured timeout; expiry surfaces as `Unavailable`.
/// No retry on failure - an ambiguous failure must not risk a double
/// increment.
async fn increment<S: CounterStore + 'static>(
    state: &Arc<AppState<S>>,
    raw_key: &str,
) -> Result<String, ApiError> {
    let start = Instant::now();

    let key = validate_key(raw_key)
        .map_err(|e| {
            state.metrics.record_error();
            ApiError::from(e)
        })?
        .to_string();

    let store = Arc::clone(&state.store);
    let task_key = key.clone();
    let task = tokio::task::spawn_blocking(move || store.atomic_increment(&task_key));

    let result = match tokio::time::timeout(state.store_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(StoreError::Unavailable(format!(
            "store task failed: {}",
            join_err
        ))),
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call exceeded {}ms",
            state.store_timeout.as_millis()
        ))),
    };

    let count = result.map_err(|e| {
        state.metrics.record_error();
        tracing::warn!(key = %key, error = %e, "increment failed");
        ApiError::from(e)
    })?;

    state
        .metrics
        .record_hit(start.elapsed().as_micros() as u64);

    Ok(count.to_string())
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// Response for stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: f64,
    pub hits: HitStats,
    pub errors_total: u64,
}

#[derive(Debug, Serialize)]
pub struct HitStats {
    pub total: u64,
    pub rate_per_sec: f64,
    pub avg_latency_us: f64,
}

/// GET /stats
pub async fn get_stats<S: CounterStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let metrics = &state.metrics;

    let uptime_secs = metrics
        .start_time
        .get()
        .map(|t| t.elapsed().as_secs_f64())
        .unwrap_or(0.0);

    let hits_total = metrics.hits_total.load(Ordering::Relaxed);
    let latency_sum = metrics.hit_latency_sum_us.load(Ordering::Relaxed);
    let errors_total = metrics.errors_total.load(Ordering::Relaxed);

    Json(StatsResponse {
        uptime_secs,
        hits: HitStats {
            total: hits_total,
            rate_per_sec: safe_rate(hits_total, uptime_secs),
            avg_latency_us: safe_avg(latency_sum, hits_total),
        },
        errors_total,
    })
}

/// Calculates rate per second, returning 0.0 if duration is zero.
#[inline]
fn safe_rate(count: u64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        count as f64 / duration_secs
    } else {
        0.0
    }
}

/// Calculates average, returning 0.0 if count is zero.
#[inline]
fn safe_avg(sum: u64, count: u64) -> f64 {
    if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    }
}
