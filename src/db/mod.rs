//! Database module

mod schema;

use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// In-memory database on a single-connection pool. Intended for tests
    /// only — data is discarded when the pool is dropped, and one connection
    /// keeps every caller on the same in-memory instance.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_DIM_IP).execute(&self.pool).await?;
        sqlx::query(schema::CREATE_DIM_USER_AGENT)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_DIM_TIME)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_DIM_REQUEST_TYPE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_DIM_API_PATH)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_DIM_PROTOCOL)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_DIM_REFERRER)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_LOG_ENTRIES)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_TIME)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_API_PATH)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_STATUS_CODE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_IP)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_total_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_top_paths(&self, limit: i32) -> Result<Vec<PathStat>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT p.api_path, COUNT(*) as count
            FROM log_entries l
            JOIN dim_api_path p ON l.api_path_id = p.id
            GROUP BY p.api_path
            ORDER BY count DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(path, count)| PathStat { path, count })
            .collect())
    }

    pub async fn get_status_counts(&self) -> Result<Vec<StatusStat>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT status_code, COUNT(*) as count
            FROM log_entries
            GROUP BY status_code
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(status_code, count)| StatusStat { status_code, count })
            .collect())
    }

    pub async fn get_top_ips(&self, limit: i32) -> Result<Vec<IpStat>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT ip.ip_address, COUNT(*) as count
            FROM log_entries l
            JOIN dim_ip ip ON l.ip_id = ip.id
            GROUP BY ip.ip_address
            ORDER BY count DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ip, count)| IpStat { ip, count })
            .collect())
    }

    /// Fact table joined against every dimension, one flat row per log entry,
    /// in fact insertion order. This is the projection the exporters consume.
    pub async fn fetch_export_rows(&self) -> Result<Vec<ExportRow>> {
        let rows: Vec<ExportRow> = sqlx::query_as(
            r#"
            SELECT
                l.id AS log_id,
                ip.ip_address,
                ua.user_agent,
                ua.browser,
                ua.os,
                ua.device_type,
                datetime(t.timestamp_utc, 'unixepoch') AS timestamp_utc,
                t.year, t.month, t.day, t.hour, t.minute, t.second, t.weekday,
                rt.request_type,
                ap.api_path,
                pr.protocol,
                l.status_code,
                l.bytes_sent,
                rf.referrer_url,
                l.response_time
            FROM log_entries l
            JOIN dim_ip ip ON l.ip_id = ip.id
            JOIN dim_user_agent ua ON l.user_agent_id = ua.id
            JOIN dim_time t ON l.time_id = t.id
            JOIN dim_request_type rt ON l.request_type_id = rt.id
            JOIN dim_api_path ap ON l.api_path_id = ap.id
            JOIN dim_protocol pr ON l.protocol_id = pr.id
            LEFT JOIN dim_referrer rf ON l.referrer_id = rf.id
            ORDER BY l.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathStat {
    pub path: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusStat {
    pub status_code: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IpStat {
    pub ip: String,
    pub count: i64,
}

/// One row of the flat export projection.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExportRow {
    pub log_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub timestamp_utc: String,
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
    pub weekday: i64,
    pub request_type: String,
    pub api_path: String,
    pub protocol: String,
    pub status_code: i64,
    pub bytes_sent: i64,
    pub referrer_url: Option<String>,
    pub response_time: i64,
}
