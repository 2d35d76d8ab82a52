//! Document and sync endpoints
//!
//! # Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/documents` - Create an empty document for the caller
//! - `GET /api/documents/:id/tree` - Persisted tree of a document
//! - `POST /api/documents/:id/sync` - Apply a sync batch
//!
//! The caller is identified by the `x-outline-user` header, set by the
//! authentication layer in front of this server.

use crate::http::{AppState, HttpError};
use crate::sync::{CreateDocumentResponse, PersistedTree, SyncRequest, USER_HEADER};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::instrument;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/documents", post(create_document))
        .route("/api/documents/:id/tree", get(load_tree))
        .route("/api/documents/:id/sync", post(sync_document))
        .with_state(state)
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Caller identity from the request headers
fn caller(headers: &HeaderMap) -> Result<String, HttpError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .ok_or_else(HttpError::unauthorized)
}

#[instrument(skip(state, headers))]
async fn create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CreateDocumentResponse>), HttpError> {
    let owner = caller(&headers)?;
    let document_id = state.apply_service.create_document(&owner).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateDocumentResponse { document_id }),
    ))
}

#[instrument(skip(state, headers))]
async fn load_tree(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PersistedTree>, HttpError> {
    let owner = caller(&headers)?;
    let tree = state.apply_service.load_tree(&document_id, &owner).await?;
    Ok(Json(tree))
}

/// Apply one batch; 204 on success, `{ errorKind }` otherwise
#[instrument(skip(state, headers, body))]
async fn sync_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<StatusCode, HttpError> {
    let owner = caller(&headers)?;
    let Json(request) = body.map_err(|e| HttpError::invalid_request(e.body_text()))?;

    if request.document_id != document_id {
        return Err(HttpError::invalid_request(format!(
            "body documentId {} does not match path {}",
            request.document_id, document_id
        )));
    }

    state
        .apply_service
        .apply(&document_id, &owner, &request.batch)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
