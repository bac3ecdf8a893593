//! Fact-row accumulation and bulk insertion
//!
//! Resolved rows are buffered in memory and written with one multi-row
//! INSERT per flush, bounding round trips on multi-megabyte imports.

use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::debug;

use crate::error::IngestError;

/// One fully resolved fact row, ready for `log_entries`.
#[derive(Debug, Clone)]
pub struct FactRow {
    pub ip_id: i64,
    pub user_agent_id: i64,
    pub time_id: i64,
    pub request_type_id: i64,
    pub api_path_id: i64,
    pub protocol_id: i64,
    pub status_code: i64,
    pub bytes_sent: i64,
    pub referrer_id: Option<i64>,
    pub response_time: i64,
}

pub struct FactBuffer {
    batch_size: usize,
    rows: Vec<FactRow>,
}

impl FactBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            rows: Vec::with_capacity(batch_size),
        }
    }

    pub fn push(&mut self, row: FactRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.batch_size
    }

    /// Bulk-insert the buffered rows in source order. The buffer is cleared
    /// only after the insert succeeds; on failure it is left intact and the
    /// caller decides whether to retry or abort.
    pub async fn flush(&mut self, tx: &mut Transaction<'_, Sqlite>) -> Result<u64, IngestError> {
        if self.rows.is_empty() {
            return Ok(0);
        }
        let count = self.rows.len() as u64;
        debug!("flushing {} fact rows", count);

        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO log_entries (ip_id, user_agent_id, time_id, request_type_id, \
             api_path_id, protocol_id, status_code, bytes_sent, referrer_id, response_time) ",
        );
        builder.push_values(self.rows.iter(), |mut row_binds, row| {
            row_binds
                .push_bind(row.ip_id)
                .push_bind(row.user_agent_id)
                .push_bind(row.time_id)
                .push_bind(row.request_type_id)
                .push_bind(row.api_path_id)
                .push_bind(row.protocol_id)
                .push_bind(row.status_code)
                .push_bind(row.bytes_sent)
                .push_bind(row.referrer_id)
                .push_bind(row.response_time);
        });
        builder.build().execute(&mut **tx).await?;

        self.rows.clear();
        Ok(count)
    }
}
