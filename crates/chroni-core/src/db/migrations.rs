//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a list of statements atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: journal records
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                entry_type TEXT NOT NULL,
                date TEXT NOT NULL,
                mood INTEGER,
                energy INTEGER,
                anxiety INTEGER,
                pain INTEGER,
                fatigue INTEGER,
                sleep_quality TEXT,
                morning_feeling TEXT,
                morning_hopes TEXT,
                morning_symptoms TEXT,
                evening_day_review TEXT,
                evening_gratitude TEXT,
                evening_symptoms TEXT,
                additional_notes TEXT,
                timestamp INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                owner_id TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_records_date ON records(date)",
            "CREATE INDEX IF NOT EXISTS idx_records_synced ON records(synced)",
        ],
    )
    .await
}

/// Migration to version 2: pending operations queue
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS pending_operations (
                operation_id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                parked INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_pending_record_id ON pending_operations(record_id)",
            "CREATE INDEX IF NOT EXISTS idx_pending_parked ON pending_operations(parked)",
        ],
    )
    .await
}

/// Migration to version 3: key/value table backing the first storage tier
async fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        CURRENT_VERSION,
        &["CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )"],
    )
    .await
}
