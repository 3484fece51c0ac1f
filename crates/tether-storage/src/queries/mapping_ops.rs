//! Persistence of temporary → real id mappings.

use rusqlite::{params, Connection};

use tether_core::errors::{StorageError, TetherResult};
use tether_core::traits::IdMapping;

use super::mutation_ops::fmt_ts;
use crate::to_storage_err;

pub fn insert_mapping(conn: &Connection, mapping: &IdMapping) -> TetherResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO id_mappings (temp_id, real_id, resource_type, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            mapping.temp_id,
            mapping.real_id,
            mapping.resource_type.as_str(),
            fmt_ts(&mapping.recorded_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn list_mappings(conn: &Connection) -> TetherResult<Vec<IdMapping>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT temp_id, real_id, resource_type, recorded_at
             FROM id_mappings ORDER BY recorded_at ASC",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let (temp_id, real_id, resource_type, recorded_at) =
            row.map_err(|e| to_storage_err(e.to_string()))?;
        let corrupt = |reason: String| StorageError::CorruptRecord {
            id: temp_id.clone(),
            reason,
        };
        let resource_type = resource_type.parse().map_err(corrupt)?;
        let recorded_at = chrono::DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&chrono::Utc);
        out.push(IdMapping {
            temp_id,
            real_id,
            resource_type,
            recorded_at,
        });
    }
    Ok(out)
}
