use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Persist QC findings against a plan. Returns the stored flags in input order.
pub fn insert_qc_flags(
    conn: &Connection,
    patient_id: &Uuid,
    plan_id: &Uuid,
    findings: &[QcFinding],
) -> Result<Vec<QcFlag>, DatabaseError> {
    let now = chrono::Local::now().naive_local();
    let created = format_timestamp(&now);
    let mut stmt = conn.prepare(
        "INSERT INTO qc_flags (id, patient_id, plan_id, flag_type, severity, message,
         suggested_fix, target_section, resolved, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
    )?;

    let mut flags = Vec::with_capacity(findings.len());
    for finding in findings {
        let flag = QcFlag {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            plan_id: *plan_id,
            flag_type: finding.flag_type.clone(),
            severity: finding.severity,
            message: finding.message.clone(),
            suggested_fix: finding.suggested_fix.clone(),
            target_section: finding.target_section,
            resolved: false,
            created_at: now,
            resolved_at: None,
        };
        stmt.execute(params![
            flag.id.to_string(),
            patient_id.to_string(),
            plan_id.to_string(),
            flag.flag_type,
            flag.severity.as_str(),
            flag.message,
            flag.suggested_fix,
            flag.target_section.map(|s| s.as_str()),
            created,
        ])?;
        flags.push(flag);
    }
    Ok(flags)
}

/// Mark every unresolved flag of the patient resolved. Returns how many changed.
pub fn resolve_all_unresolved_flags(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE qc_flags SET resolved = 1, resolved_at = ?1
         WHERE patient_id = ?2 AND resolved = 0",
        params![now_timestamp(), patient_id.to_string()],
    )?;
    Ok(changed)
}

/// Supersede the patient's open flags with a fresh QC result.
///
/// The batch-resolve and the inserts share one transaction so a reader never
/// sees both generations of flags open at once, nor neither.
pub fn replace_unresolved_flags(
    conn: &Connection,
    patient_id: &Uuid,
    plan_id: &Uuid,
    findings: &[QcFinding],
) -> Result<(usize, Vec<QcFlag>), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let superseded = resolve_all_unresolved_flags(&tx, patient_id)?;
    let flags = insert_qc_flags(&tx, patient_id, plan_id, findings)?;
    tx.commit()?;
    Ok((superseded, flags))
}

/// Resolve a single flag. Returns `false` if it was already resolved.
pub fn resolve_qc_flag(conn: &Connection, flag_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE qc_flags SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
        params![now_timestamp(), flag_id.to_string()],
    )?;
    if changed > 0 {
        return Ok(true);
    }
    match get_qc_flag(conn, flag_id)? {
        Some(_) => Ok(false),
        None => Err(DatabaseError::NotFound {
            entity_type: "QcFlag".into(),
            id: flag_id.to_string(),
        }),
    }
}

const FLAG_COLUMNS: &str = "id, patient_id, plan_id, flag_type, severity, message, suggested_fix,
     target_section, resolved, created_at, resolved_at";

pub fn get_qc_flag(conn: &Connection, flag_id: &Uuid) -> Result<Option<QcFlag>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {FLAG_COLUMNS} FROM qc_flags WHERE id = ?1"),
            params![flag_id.to_string()],
            flag_row_from_rusqlite,
        )
        .optional()?;
    row.map(flag_from_row).transpose()
}

/// Flags for a patient, optionally filtered by resolution, oldest first.
pub fn list_qc_flags(
    conn: &Connection,
    patient_id: &Uuid,
    resolved: Option<bool>,
) -> Result<Vec<QcFlag>, DatabaseError> {
    let mut flags = Vec::new();
    match resolved {
        Some(resolved) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM qc_flags
                 WHERE patient_id = ?1 AND resolved = ?2 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(
                params![patient_id.to_string(), resolved as i32],
                flag_row_from_rusqlite,
            )?;
            for row in rows {
                flags.push(flag_from_row(row?)?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM qc_flags WHERE patient_id = ?1 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![patient_id.to_string()], flag_row_from_rusqlite)?;
            for row in rows {
                flags.push(flag_from_row(row?)?);
            }
        }
    }
    Ok(flags)
}

struct FlagRow {
    id: String,
    patient_id: String,
    plan_id: String,
    flag_type: String,
    severity: String,
    message: String,
    suggested_fix: String,
    target_section: Option<String>,
    resolved: i32,
    created_at: String,
    resolved_at: Option<String>,
}

fn flag_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<FlagRow, rusqlite::Error> {
    Ok(FlagRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        plan_id: row.get(2)?,
        flag_type: row.get(3)?,
        severity: row.get(4)?,
        message: row.get(5)?,
        suggested_fix: row.get(6)?,
        target_section: row.get(7)?,
        resolved: row.get(8)?,
        created_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

fn flag_from_row(row: FlagRow) -> Result<QcFlag, DatabaseError> {
    Ok(QcFlag {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        plan_id: parse_uuid(&row.plan_id)?,
        flag_type: row.flag_type,
        severity: Severity::from_str(&row.severity)?,
        message: row.message,
        suggested_fix: row.suggested_fix,
        target_section: row
            .target_section
            .as_deref()
            .map(SectionName::from_str)
            .transpose()?,
        resolved: row.resolved != 0,
        created_at: parse_timestamp(&row.created_at)?,
        resolved_at: row
            .resolved_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
    })
}
