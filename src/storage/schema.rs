use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            owner TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS todos_created_order
            ON todos (created_at DESC, id DESC);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
