use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Record the bedside checklist and close the workflow: finalization row,
/// `final_approval_done`, and patient status `Finalized` in one transaction.
pub fn finalize_plan(
    conn: &Connection,
    patient_id: &Uuid,
    data: &FinalizationData,
) -> Result<(), DatabaseError> {
    if !data.confidence_in_range() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "nurse confidence {} outside {}..={}",
            data.nurse_confidence,
            FinalizationData::MIN_CONFIDENCE,
            FinalizationData::MAX_CONFIDENCE
        )));
    }

    let finalized_at = data
        .finalized_at
        .unwrap_or_else(|| chrono::Local::now().naive_local());

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO finalization_data (patient_id, teachback_completed, caregiver_present,
         interpreter_used, nurse_confidence, finalized_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            patient_id.to_string(),
            data.teachback_completed as i32,
            data.caregiver_present as i32,
            data.interpreter_used as i32,
            data.nurse_confidence as i32,
            format_timestamp(&finalized_at),
        ],
    )?;
    super::update_workflow_state(
        &tx,
        patient_id,
        &WorkflowPatch {
            final_approval_done: Some(true),
            ..WorkflowPatch::default()
        },
    )?;
    super::update_patient(
        &tx,
        patient_id,
        &PatientPatch {
            wf_status: Some(WorkflowStatus::Finalized),
            ..PatientPatch::default()
        },
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_latest_finalization(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<FinalizationData>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT teachback_completed, caregiver_present, interpreter_used, nurse_confidence,
             finalized_at
             FROM finalization_data WHERE patient_id = ?1 ORDER BY id DESC LIMIT 1",
            params![patient_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((teachback, caregiver, interpreter, confidence, finalized_at)) = row else {
        return Ok(None);
    };

    Ok(Some(FinalizationData {
        teachback_completed: teachback != 0,
        caregiver_present: caregiver != 0,
        interpreter_used: interpreter != 0,
        nurse_confidence: u8::try_from(confidence)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        finalized_at: Some(parse_timestamp(&finalized_at)?),
    }))
}
