//! v002: id_mappings (temporary id → server id).

use rusqlite::Connection;

use tether_core::errors::TetherResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> TetherResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS id_mappings (
            temp_id       TEXT PRIMARY KEY,
            real_id       TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            recorded_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mappings_real ON id_mappings(real_id);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
