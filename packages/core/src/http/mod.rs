//! HTTP surface of the sync server
//!
//! An axum router exposing document creation, tree loading and the batched
//! sync endpoint on top of [`ApplyService`].
//!
//! # Usage
//!
//! ```bash
//! OUTLINE_SERVER_PORT=3001 cargo run --bin sync-server
//! curl -X POST -H 'x-outline-user: alice' http://localhost:3001/api/documents
//! ```

use crate::services::ApplyService;
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod http_error;
mod sync_endpoints;

pub use http_error::HttpError;
pub use sync_endpoints::HealthStatus;

/// Environment variable listing extra allowed CORS origins (comma separated)
pub const CORS_ORIGINS_ENV: &str = "OUTLINE_CORS_ORIGINS";

/// Application state shared across all endpoints
///
/// Write serialization is per document and lives in the apply service.
#[derive(Clone)]
pub struct AppState {
    pub apply_service: Arc<ApplyService>,
}

impl AppState {
    pub fn new(apply_service: Arc<ApplyService>) -> Self {
        Self { apply_service }
    }
}

/// Create the application router with request tracing and CORS
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(sync_endpoints::routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// CORS for browser clients
///
/// Defaults to common local dev origins; `OUTLINE_CORS_ORIGINS` replaces
/// them. Origins that do not parse are skipped with a warning.
fn cors_layer() -> CorsLayer {
    let configured = std::env::var(CORS_ORIGINS_ENV).ok();
    let raw: Vec<String> = match configured {
        Some(list) => list.split(',').map(|o| o.trim().to_string()).collect(),
        None => ["http://localhost:1420", "http://localhost:5173"]
            .iter()
            .map(|o| o.to_string())
            .collect(),
    };

    let origins: Vec<HeaderValue> = raw
        .iter()
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(crate::sync::USER_HEADER),
        ])
        .allow_credentials(false)
}

/// Bind `addr` and serve the router until the process stops
///
/// # Errors
///
/// Returns error if the server fails to bind or stops abnormally.
pub async fn start_server(
    apply_service: Arc<ApplyService>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let app = create_router(AppState::new(apply_service));

    tracing::info!("🚀 Sync server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
