use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, now_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

/// Append an inpatient record. The most recent record is the one used for
/// prompt construction.
pub fn insert_inpatient_record(
    conn: &Connection,
    patient_id: &Uuid,
    record: &InpatientRecord,
) -> Result<(), DatabaseError> {
    let recorded_at = record
        .recorded_at
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(now_timestamp);
    conn.execute(
        "INSERT INTO clinical_context (patient_id, stroke_type, fall_risk, dysphagia_result,
         anticoagulant, hospital_summary, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            patient_id.to_string(),
            record.stroke_type,
            record.fall_risk,
            record.dysphagia_result,
            record.anticoagulant as i32,
            record.hospital_summary,
            recorded_at,
        ],
    )?;
    Ok(())
}

pub fn get_latest_inpatient_record(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<InpatientRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT stroke_type, fall_risk, dysphagia_result, anticoagulant, hospital_summary,
             recorded_at
             FROM clinical_context WHERE patient_id = ?1
             ORDER BY id DESC LIMIT 1",
            params![patient_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((stroke_type, fall_risk, dysphagia_result, anticoagulant, hospital_summary, recorded)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(InpatientRecord {
        stroke_type,
        fall_risk,
        dysphagia_result,
        anticoagulant: anticoagulant != 0,
        hospital_summary,
        recorded_at: Some(parse_timestamp(&recorded)?),
    }))
}
