//! Insert, read, patch, delete and id rewriting for queued mutations.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use tether_core::errors::{StorageError, TetherResult};
use tether_core::mutation::{replace_id_refs, Mutation, MutationPatch, SyncErrorDetail};

use crate::to_storage_err;

const COLUMNS: &str = "id, seq, kind, resource_type, resource_id, payload, depends_on, status, \
                       attempt, created_at, last_attempt_at, next_retry_at, last_error";

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(id: &str, raw: &str) -> TetherResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(id, format!("bad timestamp {raw}: {e}")))
}

fn corrupt(id: &str, reason: String) -> tether_core::TetherError {
    StorageError::CorruptRecord {
        id: id.to_string(),
        reason,
    }
    .into()
}

/// Raw column values, decoded outside the rusqlite row callback so that
/// decoding failures surface as storage errors.
struct RawRow {
    id: String,
    seq: i64,
    kind: String,
    resource_type: String,
    resource_id: String,
    payload: String,
    depends_on: Option<String>,
    status: String,
    attempt: u32,
    created_at: String,
    last_attempt_at: Option<String>,
    next_retry_at: Option<String>,
    last_error: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seq: row.get(1)?,
            kind: row.get(2)?,
            resource_type: row.get(3)?,
            resource_id: row.get(4)?,
            payload: row.get(5)?,
            depends_on: row.get(6)?,
            status: row.get(7)?,
            attempt: row.get(8)?,
            created_at: row.get(9)?,
            last_attempt_at: row.get(10)?,
            next_retry_at: row.get(11)?,
            last_error: row.get(12)?,
        })
    }

    fn decode(self) -> TetherResult<Mutation> {
        let id = self.id;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| corrupt(&id, format!("bad payload: {e}")))?;
        let last_error = self
            .last_error
            .map(|raw| serde_json::from_str::<SyncErrorDetail>(&raw))
            .transpose()
            .map_err(|e| corrupt(&id, format!("bad last_error: {e}")))?;
        let last_attempt_at = self
            .last_attempt_at
            .map(|raw| parse_ts(&id, &raw))
            .transpose()?;
        let next_retry_at = self
            .next_retry_at
            .map(|raw| parse_ts(&id, &raw))
            .transpose()?;
        Ok(Mutation {
            kind: self.kind.parse().map_err(|e: String| corrupt(&id, e))?,
            resource_type: self.resource_type.parse().map_err(|e: String| corrupt(&id, e))?,
            status: self.status.parse().map_err(|e: String| corrupt(&id, e))?,
            created_at: parse_ts(&id, &self.created_at)?,
            resource_id: self.resource_id.into(),
            payload,
            depends_on: self.depends_on,
            attempt: self.attempt,
            seq: self.seq,
            last_attempt_at,
            next_retry_at,
            last_error,
            id,
        })
    }
}

/// Insert a mutation, assigning the next sequence number. Returns that number.
pub fn insert_mutation(conn: &Connection, mutation: &Mutation) -> TetherResult<i64> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("insert_mutation begin: {e}")))?;

    let seq: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM mutation_queue",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut stored = mutation.clone();
    stored.seq = seq;
    write_row(&tx, &stored, true)?;

    tx.commit()
        .map_err(|e| to_storage_err(format!("insert_mutation commit: {e}")))?;
    Ok(seq)
}

/// INSERT (when `insert`) or full-row UPDATE keyed by id.
fn write_row(conn: &Connection, m: &Mutation, insert: bool) -> TetherResult<()> {
    let payload = serde_json::to_string(&m.payload)?;
    let last_error = m
        .last_error
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let sql = if insert {
        "INSERT INTO mutation_queue (
            id, seq, kind, resource_type, resource_id, payload, depends_on, status,
            attempt, created_at, last_attempt_at, next_retry_at, last_error
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    } else {
        "UPDATE mutation_queue SET
            seq = ?2, kind = ?3, resource_type = ?4, resource_id = ?5, payload = ?6,
            depends_on = ?7, status = ?8, attempt = ?9, created_at = ?10,
            last_attempt_at = ?11, next_retry_at = ?12, last_error = ?13
         WHERE id = ?1"
    };
    conn.execute(
        sql,
        params![
            m.id,
            m.seq,
            m.kind.as_str(),
            m.resource_type.as_str(),
            m.resource_id.as_str(),
            payload,
            m.depends_on,
            m.status.as_str(),
            m.attempt,
            fmt_ts(&m.created_at),
            m.last_attempt_at.as_ref().map(fmt_ts),
            m.next_retry_at.as_ref().map(fmt_ts),
            last_error,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// All queued mutations, oldest first.
pub fn list_mutations(conn: &Connection) -> TetherResult<Vec<Mutation>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {COLUMNS} FROM mutation_queue ORDER BY created_at ASC, seq ASC"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], RawRow::from_row)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))?.decode()?);
    }
    Ok(out)
}

pub fn get_mutation(conn: &Connection, id: &str) -> TetherResult<Option<Mutation>> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM mutation_queue WHERE id = ?1"),
            params![id],
            RawRow::from_row,
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    raw.map(RawRow::decode).transpose()
}

/// Read-modify-write of one mutation inside a transaction.
/// Returns `None` when the mutation is not queued.
pub fn patch_mutation(
    conn: &Connection,
    id: &str,
    patch: &MutationPatch,
) -> TetherResult<Option<Mutation>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("patch_mutation begin: {e}")))?;
    let Some(mut mutation) = get_mutation(&tx, id)? else {
        return Ok(None);
    };
    mutation.apply_patch(patch);
    write_row(&tx, &mutation, false)?;
    tx.commit()
        .map_err(|e| to_storage_err(format!("patch_mutation commit: {e}")))?;
    Ok(Some(mutation))
}

pub fn delete_mutation(conn: &Connection, id: &str) -> TetherResult<bool> {
    let n = conn
        .execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(n > 0)
}

/// Rewrite `temp_id` to `real_id` in resource ids and payloads of every
/// queued mutation, atomically.
pub fn rewrite_resource_ids(conn: &Connection, temp_id: &str, real_id: &str) -> TetherResult<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("rewrite_resource_ids begin: {e}")))?;

    // LIKE narrows the scan; the JSON walk decides.
    let pattern = format!("%{temp_id}%");
    let candidates: Vec<Mutation> = {
        let mut stmt = tx
            .prepare(&format!(
                "SELECT {COLUMNS} FROM mutation_queue WHERE resource_id = ?1 OR payload LIKE ?2"
            ))
            .map_err(|e| to_storage_err(e.to_string()))?;
        let rows = stmt
            .query_map(params![temp_id, pattern], RawRow::from_row)
            .map_err(|e| to_storage_err(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| to_storage_err(e.to_string()))?.decode()?);
        }
        out
    };

    let mut changed = 0;
    for mut m in candidates {
        let mut touched = replace_id_refs(&mut m.payload, temp_id, real_id) > 0;
        if m.resource_id.as_str() == temp_id {
            m.resource_id = real_id.into();
            touched = true;
        }
        if touched {
            write_row(&tx, &m, false)?;
            changed += 1;
        }
    }

    tx.commit()
        .map_err(|e| to_storage_err(format!("rewrite_resource_ids commit: {e}")))?;
    Ok(changed)
}

pub fn clear_dependency(conn: &Connection, dependency_id: &str) -> TetherResult<usize> {
    conn.execute(
        "UPDATE mutation_queue SET depends_on = NULL WHERE depends_on = ?1",
        params![dependency_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// `syncing` cannot survive a restart: put those rows back to `pending`.
pub fn reset_in_flight(conn: &Connection) -> TetherResult<usize> {
    conn.execute(
        "UPDATE mutation_queue SET status = 'pending' WHERE status = 'syncing'",
        [],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_unsynced(conn: &Connection) -> TetherResult<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM mutation_queue WHERE status != 'synced'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(n as usize)
}
