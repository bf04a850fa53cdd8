mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::contracts::CounterStore;

pub use handlers::{AppState, Metrics};

/// Creates the API router.
///
/// Every response, success or error, carries the permissive CORS header so
/// that browser clients on a different origin can read the body.
pub fn create_router<S: CounterStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats::<S>))
        .route("/hits", get(handlers::record_default_hit::<S>))
        .route("/hits/:path", get(handlers::record_hit::<S>))
        .layer(middleware::from_fn(allow_cross_origin))
        .with_state(state)
}

/// Adds `Access-Control-Allow-Origin: *` to every response.
async fn allow_cross_origin(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Creates a config from environment variables.
    ///
    /// Reads:
    /// - `TALLYD_HOST`: Bind address (default: 0.0.0.0)
    /// - `TALLYD_PORT`: Bind port (default: 8080)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("TALLYD_HOST").unwrap_or(default.host),
            port: std::env::var("TALLYD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, F>(
    config: ServerConfig,
    state: Arc<AppState<S>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: CounterStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
