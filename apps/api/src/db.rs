use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Idempotent schema, applied at every startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS solutions (
        id                     BLOB PRIMARY KEY NOT NULL,
        slug                   TEXT UNIQUE,
        name                   TEXT NOT NULL DEFAULT '',
        description            TEXT NOT NULL DEFAULT '',
        problem_description    TEXT NOT NULL DEFAULT '',
        target_users           TEXT NOT NULL DEFAULT '',
        usage_count            INTEGER NOT NULL DEFAULT 0,
        system_instructions    TEXT NOT NULL DEFAULT '',
        model_output_structure TEXT NOT NULL DEFAULT '',
        status                 TEXT NOT NULL DEFAULT 'draft'
                               CHECK (status IN ('draft', 'published')),
        created_at             TEXT NOT NULL,
        updated_at             TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS data_items (
        id           BLOB PRIMARY KEY NOT NULL,
        solution_id  BLOB NOT NULL REFERENCES solutions(id) ON DELETE CASCADE,
        kind         TEXT NOT NULL,
        label        TEXT NOT NULL DEFAULT '',
        content      TEXT NOT NULL,
        model_output TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_data_items_solution ON data_items(solution_id)",
    "CREATE INDEX IF NOT EXISTS idx_solutions_status ON solutions(status)",
];

/// Creates and returns a SQLite connection pool, creating the database file if needed.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Connecting to SQLite at {database_url}...");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("SQLite connection pool established");
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
