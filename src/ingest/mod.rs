//! File ingestion pipeline
//!
//! Drives parser → dimension resolver → fact buffer for one file at a time.
//! Lines are processed in fixed-size chunks, each chunk inside its own
//! transaction on a connection owned by the run; the fact buffer flushes as
//! one bulk insert whenever it reaches the batch threshold, plus a final
//! remainder flush at end of file.

mod batch;
mod resolver;

pub use batch::{FactBuffer, FactRow};
pub use resolver::{resolve, resolve_nullable, DimCache, DimValue};

use std::path::{Path, PathBuf};

use chrono::{Datelike, Timelike};
use sqlx::pool::PoolConnection;
use sqlx::{Acquire, Sqlite, Transaction};
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::db::Database;
use crate::error::IngestError;
use crate::parser::{self, ParsedLine};

/// Whether the source file is a caller upload (deleted after processing) or a
/// pre-existing local file (left in place).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    Local,
    Uploaded,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub filename: String,
    pub lines_processed: u64,
}

/// Value-to-surrogate-key caches for one ingestion run. Owned by the run and
/// dropped with it, so a crashed import can never leak stale mappings into a
/// later one, and concurrent runs never share entries.
#[derive(Default)]
struct DimensionCaches {
    ip: DimCache,
    user_agent: DimCache,
    time: DimCache,
    request_type: DimCache,
    api_path: DimCache,
    protocol: DimCache,
    referrer: DimCache,
}

/// Ingest one log file. Per-line failures are logged and skipped; store and
/// consistency errors abort the remainder of the file, keeping whatever
/// earlier flushes already committed. Uploaded files are removed from disk
/// afterwards regardless of outcome (a failed delete is only a warning).
pub async fn ingest_file(
    db: &Database,
    path: &Path,
    source: FileSource,
    batch_size: usize,
) -> Result<IngestReport, IngestError> {
    let result = ingest_inner(db, path, batch_size).await;

    if source == FileSource::Uploaded && matches!(tokio::fs::try_exists(path).await, Ok(true)) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("deleted uploaded file {}", path.display()),
            Err(err) => warn!("failed to delete uploaded file {}: {}", path.display(), err),
        }
    }

    result
}

async fn ingest_inner(
    db: &Database,
    path: &Path,
    batch_size: usize,
) -> Result<IngestReport, IngestError> {
    let filename = display_name(path);
    info!("starting ingestion of {}", filename);

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| IngestError::from_read_error(err, path))?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();

    let mut caches = DimensionCaches::default();
    let mut buffer = FactBuffer::new(batch_size);
    let mut conn = db.pool().acquire().await?;
    let mut total: u64 = 0;

    for chunk in lines.chunks(batch_size) {
        match process_chunk(&mut conn, &mut caches, &mut buffer, chunk).await {
            Ok(processed) => total += processed,
            Err(err) => {
                error!(
                    "aborting {}: {} ({} buffered rows discarded)",
                    filename,
                    err,
                    buffer.len()
                );
                return Err(err);
            }
        }
    }

    if !buffer.is_empty() {
        if let Err(err) = flush_remainder(&mut conn, &mut buffer).await {
            error!(
                "aborting {}: {} ({} buffered rows discarded)",
                filename,
                err,
                buffer.len()
            );
            return Err(err);
        }
    }

    info!("finished {}: {} lines processed", filename, total);
    Ok(IngestReport {
        filename,
        lines_processed: total,
    })
}

/// Parse, resolve and accumulate one chunk of lines inside one transaction,
/// flushing the fact buffer if it reached the batch threshold. A dropped
/// transaction (any `?` below) rolls the chunk back.
async fn process_chunk(
    conn: &mut PoolConnection<Sqlite>,
    caches: &mut DimensionCaches,
    buffer: &mut FactBuffer,
    lines: &[&str],
) -> Result<u64, IngestError> {
    let mut tx = conn.begin().await?;
    let mut processed: u64 = 0;

    for line in lines {
        let record = match parser::parse_log_line(line.trim()) {
            Ok(record) => record,
            Err(err) => {
                warn!("skipping line '{}': {}", preview(line), err);
                continue;
            }
        };
        let row = resolve_line(&mut tx, caches, &record).await?;
        buffer.push(row);
        processed += 1;
    }

    if buffer.is_full() {
        buffer.flush(&mut tx).await?;
    }
    tx.commit().await?;
    Ok(processed)
}

async fn flush_remainder(
    conn: &mut PoolConnection<Sqlite>,
    buffer: &mut FactBuffer,
) -> Result<(), IngestError> {
    let mut tx = conn.begin().await?;
    buffer.flush(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Resolve all dimensions for one parsed line into a fact row.
async fn resolve_line(
    tx: &mut Transaction<'_, Sqlite>,
    caches: &mut DimensionCaches,
    record: &ParsedLine,
) -> Result<FactRow, IngestError> {
    let ip_id = resolve(
        tx,
        &mut caches.ip,
        "dim_ip",
        &[("ip_address", DimValue::Text(record.ip_client.clone()))],
    )
    .await?;

    let ua = classify_user_agent(&record.user_agent);
    let user_agent_id = resolve(
        tx,
        &mut caches.user_agent,
        "dim_user_agent",
        &[
            ("user_agent", DimValue::Text(record.user_agent.clone())),
            ("browser", ua.browser.map_or(DimValue::Null, DimValue::Text)),
            ("os", ua.os.map_or(DimValue::Null, DimValue::Text)),
            ("device_type", DimValue::Text(ua.device_type.to_string())),
        ],
    )
    .await?;

    let ts = record.timestamp_utc;
    let time_id = resolve(
        tx,
        &mut caches.time,
        "dim_time",
        &[
            ("timestamp_utc", DimValue::Int(ts.timestamp())),
            ("year", DimValue::Int(ts.year() as i64)),
            ("month", DimValue::Int(ts.month() as i64)),
            ("day", DimValue::Int(ts.day() as i64)),
            ("hour", DimValue::Int(ts.hour() as i64)),
            ("minute", DimValue::Int(ts.minute() as i64)),
            ("second", DimValue::Int(ts.second() as i64)),
            (
                "weekday",
                DimValue::Int(ts.weekday().num_days_from_monday() as i64),
            ),
        ],
    )
    .await?;

    let request_type_id = resolve(
        tx,
        &mut caches.request_type,
        "dim_request_type",
        &[("request_type", DimValue::Text(record.request_type.clone()))],
    )
    .await?;

    let api_path_id = resolve(
        tx,
        &mut caches.api_path,
        "dim_api_path",
        &[("api_path", DimValue::Text(record.api_path.clone()))],
    )
    .await?;

    let protocol_id = resolve(
        tx,
        &mut caches.protocol,
        "dim_protocol",
        &[("protocol", DimValue::Text(record.protocol.clone()))],
    )
    .await?;

    let referrer_id = resolve_nullable(
        tx,
        &mut caches.referrer,
        "dim_referrer",
        "referrer_url",
        record.referrer.as_deref(),
    )
    .await?;

    Ok(FactRow {
        ip_id,
        user_agent_id,
        time_id,
        request_type_id,
        api_path_id,
        protocol_id,
        status_code: record.status_code,
        bytes_sent: record.bytes_sent,
        referrer_id,
        response_time: record.response_time,
    })
}

struct UaInfo {
    browser: Option<String>,
    os: Option<String>,
    device_type: &'static str,
}

/// Derive browser/OS families and a device class from the raw User-Agent
/// string via `woothee`. The raw string stays the natural key; these derived
/// columns are stored once, on first sight of the value.
fn classify_user_agent(user_agent: &str) -> UaInfo {
    let parsed = if user_agent.is_empty() {
        None
    } else {
        woothee::parser::Parser::new().parse(user_agent)
    };

    match parsed {
        Some(result) => {
            let device_type = match result.category {
                "smartphone" | "mobilephone" => "Mobile",
                "tablet" => "Tablet",
                "pc" => "PC",
                _ => "Other",
            };
            UaInfo {
                browser: known(result.name),
                os: known(result.os),
                device_type,
            }
        }
        None => UaInfo {
            browser: None,
            os: None,
            device_type: "Other",
        },
    }
}

// woothee reports unknown fields as "UNKNOWN" or an empty string.
fn known(value: &str) -> Option<String> {
    match value {
        "" | "UNKNOWN" => None,
        other => Some(other.to_string()),
    }
}

/// Sweep `local_dir` for pre-existing *.log files, ingest each in name order,
/// and log a final summary. One file's failure does not stop the sweep.
pub async fn process_local_dir(db: &Database, config: &IngestConfig) {
    if let Err(err) = tokio::fs::create_dir_all(&config.local_dir).await {
        error!("cannot create local log directory '{}': {}", config.local_dir, err);
        return;
    }

    let mut files: Vec<PathBuf> = Vec::new();
    let mut entries = match tokio::fs::read_dir(&config.local_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            error!("cannot read local log directory '{}': {}", config.local_dir, err);
            return;
        }
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "log") {
                    files.push(path);
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("error while listing '{}': {}", config.local_dir, err);
                break;
            }
        }
    }
    files.sort();

    if files.is_empty() {
        warn!("no *.log files found in '{}'", config.local_dir);
        return;
    }
    info!("found {} log files for local processing", files.len());

    let mut succeeded: u64 = 0;
    let mut failed: u64 = 0;
    let mut total_rows: u64 = 0;
    for path in &files {
        match ingest_file(db, path, FileSource::Local, config.batch_size).await {
            Ok(report) => {
                succeeded += 1;
                total_rows += report.lines_processed;
            }
            Err(err) => {
                failed += 1;
                error!("failed to ingest {}: {}", path.display(), err);
            }
        }
    }

    info!(
        "local sweep complete: {} files ok, {} failed, {} rows loaded",
        succeeded, failed, total_rows
    );
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn preview(line: &str) -> String {
    line.chars().take(100).collect()
}
