//! HTTP routes: upload, export, stats

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use cached::proc_macro::cached;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::db::{Database, IpStat, PathStat, StatusStat};
use crate::error::IngestError;
use crate::export;
use crate::ingest::{self, FileSource};

/// Serve the upload/dashboard page
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total: i64,
    pub paths: Vec<PathStat>,
    pub status_codes: Vec<StatusStat>,
    pub ips: Vec<IpStat>,
}

/// Cached stats query - 60 second TTL
#[cached(time = 60, key = "()", convert = r#"{ () }"#)]
async fn get_cached_stats(db: Database) -> StatsResponse {
    let (total, paths, status_codes, ips) = tokio::join!(
        db.get_total_count(),
        db.get_top_paths(20),
        db.get_status_counts(),
        db.get_top_ips(20)
    );

    StatsResponse {
        total: total.unwrap_or(0),
        paths: paths.unwrap_or_default(),
        status_codes: status_codes.unwrap_or_default(),
        ips: ips.unwrap_or_default(),
    }
}

/// API: Get warehouse statistics (cached for 60 seconds)
pub async fn api_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(get_cached_stats(state.db.clone()).await)
}

/// API: Upload one .log file and ingest it.
///
/// The file is persisted under the configured upload directory, processed,
/// and removed afterwards by the ingestion pipeline. Anything other than a
/// `.log` extension is rejected before ingestion starts.
pub async fn upload_log_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut saved: Option<(String, std::path::PathBuf)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid multipart request: {err}"),
                )
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field.file_name().and_then(sanitize_filename) else {
            return error_response(StatusCode::BAD_REQUEST, "no file name in request");
        };
        if !filename.to_lowercase().ends_with(".log") {
            return error_response(
                StatusCode::BAD_REQUEST,
                "only files with a .log extension are accepted",
            );
        }

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read upload: {err}"),
                )
            }
        };

        if let Err(err) = tokio::fs::create_dir_all(&state.ingest.upload_dir).await {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to prepare upload directory: {err}"),
            );
        }
        let path = Path::new(&state.ingest.upload_dir).join(&filename);
        if let Err(err) = tokio::fs::write(&path, &data).await {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to save file '{filename}': {err}"),
            );
        }
        info!("uploaded file '{}' saved to {}", filename, path.display());
        saved = Some((filename, path));
        break;
    }

    let Some((filename, path)) = saved else {
        return error_response(StatusCode::BAD_REQUEST, "no file in request");
    };

    match ingest::ingest_file(&state.db, &path, FileSource::Uploaded, state.ingest.batch_size).await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "filename": report.filename,
                "lines_processed": report.lines_processed,
            })),
        ),
        Err(err) => {
            let status = match err {
                IngestError::FileNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, format!("error processing file '{filename}': {err}"))
        }
    }
}

/// API: Download the flat fact/dimension projection as CSV
pub async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    match export::export_csv(&state.db).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"exported_logs.csv\"",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            error!("CSV export failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("export failed: {err}"),
            )
                .into_response()
        }
    }
}

/// Reduce an uploaded name to its final path component, dropping anything
/// that could escape the upload directory.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(json!({ "status": "error", "message": message.into() })),
    )
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/access.log").as_deref(),
            Some("access.log")
        );
        assert_eq!(sanitize_filename("server.log").as_deref(), Some("server.log"));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename(""), None);
    }
}
