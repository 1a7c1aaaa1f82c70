//! Schema versioning for the SQLite backend.

use rusqlite::{Connection, params};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;

use super::error::SqliteResult;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS games (
            community_id INTEGER PRIMARY KEY,
            destination_id INTEGER,
            active INTEGER NOT NULL DEFAULT 0,
            hammer_active INTEGER NOT NULL DEFAULT 0,
            hammer_end_ms INTEGER,
            last_update_ms INTEGER
        );

        CREATE TABLE IF NOT EXISTS votes (
            community_id INTEGER NOT NULL,
            voter_id INTEGER NOT NULL,
            target_id INTEGER NOT NULL,
            PRIMARY KEY (community_id, voter_id)
        );

        CREATE TABLE IF NOT EXISTS eliminated (
            community_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            PRIMARY KEY (community_id, player_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_target ON votes(community_id, target_id);
    "#,
}];

fn init_migrations_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn current_version(conn: &Connection) -> SqliteResult<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> SqliteResult<()> {
    init_migrations_table(conn)?;
    let current = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            description = migration.description,
            "Applying SQLite migration"
        );
        conn.execute_batch(migration.sql)?;
        let applied_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        conn.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.description, applied_at],
        )?;
    }

    Ok(())
}
