//! Deduplicated get-or-create dimension lookups
//!
//! The per-run cache is only a hint: concurrent ingestion runs may race to
//! insert the same natural-key value, and the store's UNIQUE constraint is
//! the single source of truth. The insert therefore runs in a nested
//! transaction (a SQLite SAVEPOINT) so a uniqueness conflict can be rolled
//! back and resolved by re-reading, without aborting the outer transaction.

use std::collections::HashMap;

use sqlx::{Acquire, QueryBuilder, Sqlite, Transaction};
use tracing::debug;

use crate::error::IngestError;

/// A natural-key attribute value headed for a dimension column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimValue {
    Text(String),
    Int(i64),
    Null,
}

pub type DimCache = HashMap<DimValue, i64>;

/// Resolve a natural-key value to its surrogate id, creating the dimension
/// row on first sight. `columns` is ordered; the first entry is the natural
/// key the table is UNIQUE on, and must not be [`DimValue::Null`] here (use
/// [`resolve_nullable`] for the nullable Referrer dimension).
///
/// Both the lookup and the insert path populate `cache` before returning.
pub async fn resolve(
    tx: &mut Transaction<'_, Sqlite>,
    cache: &mut DimCache,
    table: &'static str,
    columns: &[(&'static str, DimValue)],
) -> Result<i64, IngestError> {
    let (key_column, key) = &columns[0];
    debug_assert!(*key != DimValue::Null, "natural key must be present");

    if let Some(id) = cache.get(key) {
        return Ok(*id);
    }

    if let Some(id) = select_id(tx, table, key_column, key).await? {
        cache.insert(key.clone(), id);
        return Ok(id);
    }

    // Not seen yet: insert under a savepoint so a lost race leaves the outer
    // transaction intact.
    let mut savepoint = tx.begin().await?;
    match insert_row(&mut savepoint, table, columns).await {
        Ok(id) => {
            savepoint.commit().await?;
            cache.insert(key.clone(), id);
            Ok(id)
        }
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await?;
            debug!(table, "dimension insert lost a uniqueness race, re-selecting");
            match select_id(tx, table, key_column, key).await? {
                Some(id) => {
                    cache.insert(key.clone(), id);
                    Ok(id)
                }
                None => Err(IngestError::DimensionConsistency {
                    table,
                    value: format!("{key:?}"),
                }),
            }
        }
        Err(err) => {
            savepoint.rollback().await?;
            Err(err.into())
        }
    }
}

/// Nullable-key variant: an absent value resolves to `None` without touching
/// the cache or the store.
pub async fn resolve_nullable(
    tx: &mut Transaction<'_, Sqlite>,
    cache: &mut DimCache,
    table: &'static str,
    key_column: &'static str,
    key: Option<&str>,
) -> Result<Option<i64>, IngestError> {
    match key {
        None => Ok(None),
        Some(value) => resolve(
            tx,
            cache,
            table,
            &[(key_column, DimValue::Text(value.to_string()))],
        )
        .await
        .map(Some),
    }
}

async fn select_id(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    key_column: &'static str,
    key: &DimValue,
) -> Result<Option<i64>, sqlx::Error> {
    let sql = format!("SELECT id FROM {table} WHERE {key_column} = ?");
    let query = sqlx::query_as::<_, (i64,)>(&sql);
    let query = match key {
        DimValue::Text(value) => query.bind(value.clone()),
        DimValue::Int(value) => query.bind(*value),
        DimValue::Null => return Ok(None),
    };
    let row = query.fetch_optional(&mut **tx).await?;
    Ok(row.map(|(id,)| id))
}

async fn insert_row(
    savepoint: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    columns: &[(&'static str, DimValue)],
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {table} ("));
    let mut names = builder.separated(", ");
    for (column, _) in columns {
        names.push(*column);
    }
    builder.push(") VALUES (");
    let mut values = builder.separated(", ");
    for (_, value) in columns {
        match value {
            DimValue::Text(text) => values.push_bind(text.clone()),
            DimValue::Int(int) => values.push_bind(*int),
            DimValue::Null => values.push_bind(Option::<String>::None),
        };
    }
    builder.push(") RETURNING id");

    let (id,): (i64,) = builder.build_query_as().fetch_one(&mut **savepoint).await?;
    Ok(id)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
