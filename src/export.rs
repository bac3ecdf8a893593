//! Flat export of the star schema
//!
//! Serializes the joined fact/dimension projection produced by
//! [`Database::fetch_export_rows`] to CSV.

use anyhow::Result;

use crate::db::{Database, ExportRow};

/// Render the flat projection as CSV with a header row.
pub fn to_csv(rows: &[ExportRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(writer.into_inner()?)
}

/// Fetch every log entry joined against its dimensions and serialize to CSV.
pub async fn export_csv(db: &Database) -> Result<Vec<u8>> {
    let rows = db.fetch_export_rows().await?;
    to_csv(&rows)
}
