//! HTTP API Tests
//!
//! Exercises the axum router in-process with `tower::ServiceExt::oneshot`,
//! plus one round trip through `HttpTransport` against a live listener.

#[cfg(test)]
mod http_api_tests {
    use anyhow::Result;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use outline_core::http::{create_router, AppState};
    use outline_core::sync::{
        CreateDocumentResponse, HttpTransport, PersistedTree, SyncError, SyncErrorKind,
        SyncErrorResponse, SyncRequest, USER_HEADER,
    };
    use outline_core::{
        ApplyService, DatabaseService, OutlineStore, SaveOutcome, SharedOutline, SyncClient,
        SyncConfig,
    };
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn create_app() -> Result<(Router, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("http.db")).await?;
        let service = Arc::new(ApplyService::new(Arc::new(db)));
        Ok((create_router(AppState::new(service)), temp_dir))
    }

    fn request(method: Method, uri: &str, user: Option<&str>, body: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> Result<T> {
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn create_document(app: &Router, user: &str) -> Result<String> {
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/documents", Some(user), None))
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreateDocumentResponse = read_json(response).await?;
        Ok(created.document_id)
    }

    #[tokio::test]
    async fn test_health_check() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let response = app
            .oneshot(request(Method::GET, "/api/health", None, None))
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(response).await?;
        assert_eq!(body["status"], "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_then_load_tree() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let doc = create_document(&app, "alice").await?;

        let mut outline = OutlineStore::new();
        let batch = outline.begin_sync().expect("pending insert");
        let body = serde_json::to_string(&SyncRequest::new(doc.clone(), batch))?;

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/documents/{}/sync", doc),
                Some("alice"),
                Some(body),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/documents/{}/tree", doc),
                Some("alice"),
                None,
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let tree: PersistedTree = read_json(response).await?;
        assert_eq!(tree, outline.to_persisted());
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_returns_error_kind() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let doc = create_document(&app, "alice").await?;

        let body = json!({
            "documentId": doc,
            "children": { "root": [] },
            "mutations": {}
        });
        let response = app
            .oneshot(request(
                Method::POST,
                &format!("/api/documents/{}/sync", doc),
                Some("alice"),
                Some(body.to_string()),
            ))
            .await?;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: SyncErrorResponse = read_json(response).await?;
        assert_eq!(error.error_kind, "RootNodeEmpty");
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_document_is_not_found() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let doc = create_document(&app, "alice").await?;

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/documents/{}/tree", doc),
                Some("mallory"),
                None,
            ))
            .await?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: SyncErrorResponse = read_json(response).await?;
        assert_eq!(error.error_kind, "DocumentDoesNotExist");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let response = app
            .oneshot(request(Method::POST, "/api/documents", None, None))
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let doc = create_document(&app, "alice").await?;

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/documents/{}/sync", doc),
                Some("alice"),
                Some("{not json".to_string()),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mismatched = json!({
            "documentId": "someone-else",
            "children": { "root": ["a"] },
            "mutations": { "insert": { "a": {} } }
        });
        let response = app
            .oneshot(request(
                Method::POST,
                &format!("/api/documents/{}/sync", doc),
                Some("alice"),
                Some(mismatched.to_string()),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: SyncErrorResponse = read_json(response).await?;
        assert_eq!(error.error_kind, "InvalidRequest");
        Ok(())
    }

    #[tokio::test]
    async fn test_http_transport_against_live_server() -> Result<()> {
        let (app, _temp_dir) = create_app().await?;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let transport = HttpTransport::new(base_url.clone(), "alice");
        let doc = transport.create_document().await?;

        let store: SharedOutline = Arc::new(Mutex::new(OutlineStore::new()));
        let client = SyncClient::new(
            doc.clone(),
            store.clone(),
            Arc::new(transport.clone()),
            SyncConfig::default(),
        );
        {
            let mut outline = store.lock().unwrap();
            let first = outline.root_children()[0].clone();
            outline.update_content(&first, "Buy milk")?;
            outline.add(&first, None)?;
        }
        assert!(matches!(client.save().await?, SaveOutcome::Synced { mutation_count: 2, .. }));

        let tree = transport.load_tree(&doc).await?;
        assert_eq!(tree, store.lock().unwrap().to_persisted());

        let stranger = HttpTransport::new(base_url, "mallory");
        let err = stranger.load_tree(&doc).await.unwrap_err();
        assert_eq!(err, SyncError::Rejected(SyncErrorKind::DocumentDoesNotExist));
        Ok(())
    }
}
