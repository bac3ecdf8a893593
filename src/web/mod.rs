//! Web server module

mod routes;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::{Config, IngestConfig};
use crate::db::Database;

// Log uploads routinely run to tens of megabytes; axum's 2 MB default would
// reject them.
const UPLOAD_BODY_LIMIT: usize = 256 * 1024 * 1024;

pub struct AppState {
    pub db: Database,
    pub ingest: IngestConfig,
}

pub async fn start_server(config: &Config, db: Database) -> Result<()> {
    let state = Arc::new(AppState {
        db,
        ingest: config.ingest.clone(),
    });

    let app = Router::new()
        .route("/", get(routes::index))
        .route("/upload", post(routes::upload_log_file))
        .route("/export/csv", get(routes::export_csv))
        .route("/api/stats", get(routes::api_stats))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
