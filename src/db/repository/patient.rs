use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Insert a patient together with their (all-false) workflow row.
pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let created = format_timestamp(&patient.created_at);
    tx.execute(
        "INSERT INTO patients (id, name, mrn, language, disposition, qc_status, wf_status,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.mrn,
            patient.language.as_str(),
            patient.disposition,
            patient.qc_status.as_str(),
            patient.wf_status.as_str(),
            created,
        ],
    )?;
    super::init_workflow_state(&tx, &patient.id)?;
    tx.commit()?;
    Ok(())
}

const PATIENT_COLUMNS: &str =
    "id, name, mrn, language, disposition, qc_status, wf_status, created_at";

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            patient_row_from_rusqlite,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_mrn(conn: &Connection, mrn: &str) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE mrn = ?1"),
            params![mrn],
            patient_row_from_rusqlite,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at, name"
    ))?;
    let rows = stmt.query_map([], patient_row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Case-insensitive search over name and MRN.
pub fn search_patients(conn: &Connection, query: &str) -> Result<Vec<Patient>, DatabaseError> {
    let pattern = format!("%{query}%");
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE LOWER(name) LIKE LOWER(?1) OR LOWER(mrn) LIKE LOWER(?1)
         ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![pattern], patient_row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Write the `Some` fields of `patch`. An empty patch only checks existence.
pub fn update_patient(
    conn: &Connection,
    id: &Uuid,
    patch: &PatientPatch,
) -> Result<(), DatabaseError> {
    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(name) = &patch.name {
        assignments.push("name = ?");
        values.push(name.clone());
    }
    if let Some(mrn) = &patch.mrn {
        assignments.push("mrn = ?");
        values.push(mrn.clone());
    }
    if let Some(language) = patch.language {
        assignments.push("language = ?");
        values.push(language.as_str().to_string());
    }
    if let Some(disposition) = &patch.disposition {
        assignments.push("disposition = ?");
        values.push(disposition.clone());
    }
    if let Some(status) = patch.qc_status {
        assignments.push("qc_status = ?");
        values.push(status.as_str().to_string());
    }
    if let Some(status) = patch.wf_status {
        assignments.push("wf_status = ?");
        values.push(status.as_str().to_string());
    }

    assignments.push("updated_at = ?");
    values.push(now_timestamp());

    let sql = format!(
        "UPDATE patients SET {} WHERE id = ?",
        assignments.join(", ")
    );
    values.push(id.to_string());

    let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

struct PatientRow {
    id: String,
    name: String,
    mrn: String,
    language: String,
    disposition: String,
    qc_status: String,
    wf_status: String,
    created_at: String,
}

fn patient_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PatientRow, rusqlite::Error> {
    Ok(PatientRow {
        id: row.get(0)?,
        name: row.get(1)?,
        mrn: row.get(2)?,
        language: row.get(3)?,
        disposition: row.get(4)?,
        qc_status: row.get(5)?,
        wf_status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid(&row.id)?,
        name: row.name,
        mrn: row.mrn,
        language: Language::from_str(&row.language)?,
        disposition: row.disposition,
        qc_status: Severity::from_str(&row.qc_status)?,
        wf_status: WorkflowStatus::from_str(&row.wf_status)?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}
