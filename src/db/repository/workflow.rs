use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::now_timestamp;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Create the all-false workflow row for a new patient.
pub fn init_workflow_state(conn: &Connection, patient_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO workflow_state (patient_id, updated_at) VALUES (?1, ?2)",
        params![patient_id.to_string(), now_timestamp()],
    )?;
    Ok(())
}

pub fn get_workflow_state(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<WorkflowState>, DatabaseError> {
    let state = conn
        .query_row(
            "SELECT hospital_summary_done, ai_generation_done, qc_analysis_done,
             qc_clearance_done, final_approval_done
             FROM workflow_state WHERE patient_id = ?1",
            params![patient_id.to_string()],
            |row| {
                Ok(WorkflowState {
                    hospital_summary_done: row.get::<_, i32>(0)? != 0,
                    ai_generation_done: row.get::<_, i32>(1)? != 0,
                    qc_analysis_done: row.get::<_, i32>(2)? != 0,
                    qc_clearance_done: row.get::<_, i32>(3)? != 0,
                    final_approval_done: row.get::<_, i32>(4)? != 0,
                })
            },
        )
        .optional()?;
    Ok(state)
}

/// Write the `Some` gates of `patch`. An empty patch writes nothing.
pub fn update_workflow_state(
    conn: &Connection,
    patient_id: &Uuid,
    patch: &WorkflowPatch,
) -> Result<(), DatabaseError> {
    if patch.is_empty() {
        return Ok(());
    }

    let gates = [
        ("hospital_summary_done", patch.hospital_summary_done),
        ("ai_generation_done", patch.ai_generation_done),
        ("qc_analysis_done", patch.qc_analysis_done),
        ("qc_clearance_done", patch.qc_clearance_done),
        ("final_approval_done", patch.final_approval_done),
    ];

    let mut assignments = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();
    for (column, value) in gates {
        if let Some(v) = value {
            assignments.push(format!("{column} = ?"));
            values.push((v as i64).into());
        }
    }
    assignments.push("updated_at = ?".to_string());
    values.push(now_timestamp().into());
    values.push(patient_id.to_string().into());

    let sql = format!(
        "UPDATE workflow_state SET {} WHERE patient_id = ?",
        assignments.join(", ")
    );
    let changed = conn.execute(&sql, rusqlite::params_from_iter(values))?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "WorkflowState".into(),
            id: patient_id.to_string(),
        });
    }
    Ok(())
}

/// Store a recomputed QC assessment: the patient's aggregate status and the
/// clearance gate change together or not at all.
pub fn write_qc_assessment(
    conn: &Connection,
    patient_id: &Uuid,
    status: Severity,
    clearance: bool,
    analysis_done: bool,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    super::update_patient(&tx, patient_id, &PatientPatch::qc_status(status))?;
    update_workflow_state(
        &tx,
        patient_id,
        &WorkflowPatch {
            qc_clearance_done: Some(clearance),
            qc_analysis_done: analysis_done.then_some(true),
            ..WorkflowPatch::default()
        },
    )?;
    tx.commit()?;
    Ok(())
}
