//! HTTP error handling for the sync endpoints
//!
//! Every failure leaves the server as `{ "errorKind": ... }`, the same body
//! the sync client parses back into a [`SyncError`](crate::sync::SyncError).

use crate::services::ApplyError;
use crate::sync::SyncErrorKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

pub const INTERNAL: &str = "Internal";
pub const INVALID_REQUEST: &str = "InvalidRequest";
pub const UNAUTHORIZED: &str = "Unauthorized";

/// HTTP error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// A `SyncErrorKind` name, or one of `Internal`/`InvalidRequest`/`Unauthorized`
    pub error_kind: String,
    /// Human-readable detail for logs and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HttpError {
    pub fn new(error_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            message: Some(message.into()),
        }
    }

    /// Rejection body; carries only the kind
    pub fn rejected(kind: SyncErrorKind) -> Self {
        Self {
            error_kind: kind.to_string(),
            message: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(UNAUTHORIZED, "missing caller identity")
    }

    pub fn status(&self) -> StatusCode {
        match self.error_kind.as_str() {
            INTERNAL => StatusCode::INTERNAL_SERVER_ERROR,
            INVALID_REQUEST => StatusCode::BAD_REQUEST,
            UNAUTHORIZED => StatusCode::UNAUTHORIZED,
            kind => match kind.parse::<SyncErrorKind>() {
                Ok(kind) if kind.is_conflict() => StatusCode::CONFLICT,
                Ok(_) => StatusCode::NOT_FOUND,
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ApplyError> for HttpError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Rejected { kind, .. } => HttpError::rejected(kind),
            ApplyError::Database(db_error) => HttpError::new(INTERNAL, db_error.to_string()),
        }
    }
}
