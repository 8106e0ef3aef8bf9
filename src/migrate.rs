use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per owner; replaced on every successful re-index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_records (
            owner_id TEXT PRIMARY KEY,
            source_url TEXT NOT NULL,
            display_name TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_records_indexed_at ON index_records(indexed_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
