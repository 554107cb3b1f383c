use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Ordered schema changes, each applied once.
const MIGRATIONS: &[(&str, &str, &str)] = &[(
    "001",
    "key_value_store",
    include_str!("migrations/001_initial.sql"),
)];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(TRACKING_TABLE)
        .context("Failed to create schema_migrations table")?;

    let applied = applied_versions(conn)?;
    for &(version, name, sql) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }
        tracing::info!(version, name, "applying schema migration");

        // The schema change and its bookkeeping row commit together.
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration {} ({})", version, name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            (version, name, chrono::Utc::now().to_rfc3339()),
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(versions)
}
