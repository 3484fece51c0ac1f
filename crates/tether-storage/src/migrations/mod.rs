//! Versioned schema migrations, tracked in `schema_version`.

mod v001_mutation_queue;
mod v002_id_mappings;

use rusqlite::Connection;
use tracing::info;

use tether_core::errors::{StorageError, TetherResult};

use crate::to_storage_err;

type MigrationFn = fn(&Connection) -> TetherResult<()>;

const MIGRATIONS: &[(u32, &str, MigrationFn)] = &[
    (1, "mutation_queue", v001_mutation_queue::migrate),
    (2, "id_mappings", v002_id_mappings::migrate),
];

/// Latest schema version known to this build.
pub const LATEST_VERSION: u32 = 2;

/// Apply every migration newer than the recorded schema version.
/// Each migration runs in its own transaction together with its version bump.
pub fn run_migrations(conn: &Connection) -> TetherResult<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current = current_version(conn)?;
    for &(version, name, migrate) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("migration {version} begin: {e}")))?;
        migrate(&tx).map_err(|e| StorageError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO schema_version (version, name) VALUES (?1, ?2)",
            rusqlite::params![version, name],
        )
        .map_err(|e| StorageError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("migration {version} commit: {e}")))?;
        info!(version, name, "applied migration");
    }
    current_version(conn)
}

/// Highest applied schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> TetherResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
