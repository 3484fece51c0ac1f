//! v001: mutation_queue.

use rusqlite::Connection;

use tether_core::errors::TetherResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> TetherResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS mutation_queue (
            id              TEXT PRIMARY KEY,
            seq             INTEGER NOT NULL UNIQUE,
            kind            TEXT NOT NULL,
            resource_type   TEXT NOT NULL,
            resource_id     TEXT NOT NULL,
            payload         TEXT NOT NULL DEFAULT 'null',
            depends_on      TEXT,
            status          TEXT NOT NULL DEFAULT 'pending',
            attempt         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            last_attempt_at TEXT,
            next_retry_at   TEXT,
            last_error      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_queue_order ON mutation_queue(created_at, seq);
        CREATE INDEX IF NOT EXISTS idx_queue_resource ON mutation_queue(resource_type, resource_id);
        CREATE INDEX IF NOT EXISTS idx_queue_status ON mutation_queue(status);
        CREATE INDEX IF NOT EXISTS idx_queue_depends_on ON mutation_queue(depends_on);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
