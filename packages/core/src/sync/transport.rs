//! Sync Transport
//!
//! The seam between [`SyncClient`](super::SyncClient) and the network. The
//! client only needs "send this batch, tell me whether it was applied";
//! [`HttpTransport`] does that against the axum sync endpoint and tests swap
//! in an in-memory implementation.

use crate::config::SyncConfig;
use crate::sync::error::{SyncError, SyncErrorKind};
use crate::sync::wire::{
    CreateDocumentResponse, PersistedTree, SyncErrorResponse, SyncRequest, USER_HEADER,
};
use async_trait::async_trait;

/// Delivers one batch to the server
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Ok only when the server applied the whole batch
    async fn send(&self, request: SyncRequest) -> Result<(), SyncError>;
}

/// reqwest client for the HTTP sync surface
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, user_id)
    }

    /// Transport for the server named in the client's sync preferences
    pub fn from_config(config: &SyncConfig, user_id: impl Into<String>) -> Self {
        Self::new(config.base_url.clone(), user_id)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create an empty document owned by this transport's user
    pub async fn create_document(&self) -> Result<String, SyncError> {
        let res = self
            .client
            .post(self.url("/api/documents"))
            .header(USER_HEADER, &self.user_id)
            .send()
            .await
            .map_err(network)?;

        let res = check_status(res).await?;
        let body: CreateDocumentResponse = res.json().await.map_err(network)?;
        Ok(body.document_id)
    }

    /// Fetch the persisted tree of a document
    pub async fn load_tree(&self, document_id: &str) -> Result<PersistedTree, SyncError> {
        let res = self
            .client
            .get(self.url(&format!("/api/documents/{}/tree", document_id)))
            .header(USER_HEADER, &self.user_id)
            .send()
            .await
            .map_err(network)?;

        let res = check_status(res).await?;
        res.json().await.map_err(network)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn send(&self, request: SyncRequest) -> Result<(), SyncError> {
        let url = self.url(&format!("/api/documents/{}/sync", request.document_id));
        let res = self
            .client
            .post(url)
            .header(USER_HEADER, &self.user_id)
            .json(&request)
            .send()
            .await
            .map_err(network)?;

        check_status(res).await.map(|_| ())
    }
}

fn network(e: reqwest::Error) -> SyncError {
    SyncError::transport(e.to_string())
}

/// Pass successful responses through; turn failures into [`SyncError`]
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

fn error_from_body(status: u16, body: &str) -> SyncError {
    match serde_json::from_str::<SyncErrorResponse>(body) {
        Ok(response) => match response.error_kind.parse::<SyncErrorKind>() {
            Ok(kind) => SyncError::Rejected(kind),
            Err(_) => SyncError::server(
                status,
                response.message.unwrap_or(response.error_kind),
            ),
        },
        Err(_) => SyncError::server(status, body),
    }
}
