//! Standalone sync server
//!
//! Serves the outline sync endpoints over HTTP against a local libsql
//! database, for browser clients during development.
//!
//! Configuration comes from the environment:
//!
//! - `OUTLINE_DB_PATH` - database file (default `~/.outline/outline.db`)
//! - `OUTLINE_SERVER_PORT` - listen port (default 3001)
//! - `OUTLINE_BIND_ADDR` - listen address (default 127.0.0.1)
//! - `OUTLINE_CORS_ORIGINS` - comma-separated allowed origins
//! - `RUST_LOG` - log filter (default `info`)

use anyhow::Result;
use outline_core::http::start_server;
use outline_core::{ApplyService, DatabaseService, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().map_err(anyhow::Error::msg)?;
    tracing::info!("📂 Using database at {}", config.database_path.display());

    let db = DatabaseService::new(config.database_path.clone()).await?;
    let apply_service = Arc::new(ApplyService::new(Arc::new(db)));

    start_server(apply_service, config.socket_address()).await
}
