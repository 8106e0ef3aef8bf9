//! Per-owner index records.
//!
//! An [`IndexRecord`] says which folder an owner's index was built from and
//! what to call it. The record and the index blob are written separately;
//! callers treat a record without a loadable blob as "not indexed".

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;

/// Name used when the caller does not supply one.
pub const DEFAULT_DISPLAY_NAME: &str = "G-Drive Folder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub owner_id: String,
    pub source_url: String,
    pub display_name: String,
    /// Unix seconds.
    pub indexed_at: i64,
}

/// Replace the owner's record in one transaction.
pub async fn replace_record(pool: &SqlitePool, record: &IndexRecord) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM index_records WHERE owner_id = ?")
        .bind(&record.owner_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO index_records (owner_id, source_url, display_name, indexed_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&record.owner_id)
    .bind(&record.source_url)
    .bind(&record.display_name)
    .bind(record.indexed_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_record(pool: &SqlitePool, owner_id: &str) -> Result<Option<IndexRecord>> {
    let row: Option<(String, String, String, i64)> = sqlx::query_as(
        "SELECT owner_id, source_url, display_name, indexed_at FROM index_records WHERE owner_id = ?",
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(owner_id, source_url, display_name, indexed_at)| IndexRecord {
            owner_id,
            source_url,
            display_name,
            indexed_at,
        },
    ))
}

pub async fn delete_record(pool: &SqlitePool, owner_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM index_records WHERE owner_id = ?")
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
