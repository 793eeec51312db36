use rusqlite::{params, Connection};
use uuid::Uuid;

use super::now_timestamp;
use crate::db::DatabaseError;
use crate::models::*;

/// Append one event to the audit log.
pub fn insert_audit_event(
    conn: &Connection,
    patient_id: Option<&Uuid>,
    message: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (patient_id, timestamp, message) VALUES (?1, ?2, ?3)",
        params![patient_id.map(|id| id.to_string()), now_timestamp(), message],
    )?;
    Ok(())
}

/// Most recent events for a patient, newest first.
pub fn recent_audit_events(
    conn: &Connection,
    patient_id: &Uuid,
    limit: usize,
) -> Result<Vec<AuditEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, timestamp, message FROM audit_log
         WHERE patient_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![patient_id.to_string(), limit as i64], |row| {
            Ok(AuditEvent {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                timestamp: row.get(2)?,
                message: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}
