use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Create the next plan version for a patient with all six sections.
///
/// Prior plans are marked non-current, the new plan gets `max(version) + 1`,
/// and every section row is written in the same transaction: either the
/// whole plan lands or nothing does. The same transaction sets
/// `ai_generation_done` and resets the patient to unreviewed (YELLOW, no
/// analysis, no clearance) until QC runs on the new plan.
pub fn create_plan_with_sections(
    conn: &Connection,
    patient_id: &Uuid,
    options: &PlanOptions,
    sections: &SectionMap,
) -> Result<Plan, DatabaseError> {
    if sections.len() != SectionName::ALL.len() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "plan requires {} sections, got {}",
            SectionName::ALL.len(),
            sections.len()
        )));
    }

    let tx = conn.unchecked_transaction()?;
    let pid = patient_id.to_string();

    let version: i64 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM discharge_plans WHERE patient_id = ?1",
        params![pid],
        |row| row.get(0),
    )?;

    tx.execute(
        "UPDATE discharge_plans SET is_current = 0 WHERE patient_id = ?1 AND is_current = 1",
        params![pid],
    )?;

    let now = chrono::Local::now().naive_local();
    let plan = Plan {
        id: Uuid::new_v4(),
        patient_id: *patient_id,
        version,
        options: *options,
        is_current: true,
        created_at: now,
    };
    let created = format_timestamp(&now);

    tx.execute(
        "INSERT INTO discharge_plans (id, patient_id, version, language, reading_level,
         include_caregiver, is_current, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            plan.id.to_string(),
            pid,
            version,
            options.language.as_str(),
            options.reading_level.as_str(),
            options.include_caregiver as i32,
            created,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO plan_sections (plan_id, section_name, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )?;
        for (name, content) in sections.iter() {
            stmt.execute(params![plan.id.to_string(), name.as_str(), content, created])?;
        }
    }

    super::update_patient(&tx, patient_id, &PatientPatch::qc_status(Severity::Yellow))?;
    super::update_workflow_state(
        &tx,
        patient_id,
        &WorkflowPatch {
            ai_generation_done: Some(true),
            qc_analysis_done: Some(false),
            qc_clearance_done: Some(false),
            ..WorkflowPatch::default()
        },
    )?;

    tx.commit()?;
    Ok(plan)
}

const PLAN_COLUMNS: &str =
    "id, patient_id, version, language, reading_level, include_caregiver, is_current, created_at";

pub fn get_current_plan(conn: &Connection, patient_id: &Uuid) -> Result<Option<Plan>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PLAN_COLUMNS} FROM discharge_plans
                 WHERE patient_id = ?1 AND is_current = 1"
            ),
            params![patient_id.to_string()],
            plan_row_from_rusqlite,
        )
        .optional()?;
    row.map(plan_from_row).transpose()
}

pub fn get_plan(conn: &Connection, plan_id: &Uuid) -> Result<Option<Plan>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM discharge_plans WHERE id = ?1"),
            params![plan_id.to_string()],
            plan_row_from_rusqlite,
        )
        .optional()?;
    row.map(plan_from_row).transpose()
}

/// Every plan version for the patient, newest first.
pub fn list_plan_history(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Plan>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAN_COLUMNS} FROM discharge_plans WHERE patient_id = ?1 ORDER BY version DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], plan_row_from_rusqlite)?;

    let mut plans = Vec::new();
    for row in rows {
        plans.push(plan_from_row(row?)?);
    }
    Ok(plans)
}

pub fn get_plan_sections(conn: &Connection, plan_id: &Uuid) -> Result<SectionMap, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT section_name, content FROM plan_sections WHERE plan_id = ?1",
    )?;
    let rows = stmt.query_map(params![plan_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut sections = SectionMap::new();
    for row in rows {
        let (name, content) = row?;
        sections.insert(SectionName::from_str(&name)?, content);
    }
    Ok(sections)
}

pub fn get_section(
    conn: &Connection,
    plan_id: &Uuid,
    name: SectionName,
) -> Result<Option<String>, DatabaseError> {
    let content = conn
        .query_row(
            "SELECT content FROM plan_sections WHERE plan_id = ?1 AND section_name = ?2",
            params![plan_id.to_string(), name.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(content)
}

/// Overwrite an existing section. Returns `false` when the plan has no such
/// section row.
pub fn update_section_content(
    conn: &Connection,
    plan_id: &Uuid,
    name: SectionName,
    content: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE plan_sections SET content = ?1, updated_at = ?2
         WHERE plan_id = ?3 AND section_name = ?4",
        params![content, now_timestamp(), plan_id.to_string(), name.as_str()],
    )?;
    Ok(changed > 0)
}

/// Insert or overwrite a section by plan and name.
pub fn upsert_section(
    conn: &Connection,
    plan_id: &Uuid,
    name: SectionName,
    content: &str,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO plan_sections (plan_id, section_name, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (plan_id, section_name)
         DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
        params![plan_id.to_string(), name.as_str(), content, now],
    )?;
    Ok(())
}

struct PlanRow {
    id: String,
    patient_id: String,
    version: i64,
    language: String,
    reading_level: String,
    include_caregiver: i32,
    is_current: i32,
    created_at: String,
}

fn plan_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PlanRow, rusqlite::Error> {
    Ok(PlanRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        version: row.get(2)?,
        language: row.get(3)?,
        reading_level: row.get(4)?,
        include_caregiver: row.get(5)?,
        is_current: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn plan_from_row(row: PlanRow) -> Result<Plan, DatabaseError> {
    Ok(Plan {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        version: row.version,
        options: PlanOptions {
            language: Language::from_str(&row.language)?,
            reading_level: ReadingLevel::from_str(&row.reading_level)?,
            include_caregiver: row.include_caregiver != 0,
        },
        is_current: row.is_current != 0,
        created_at: parse_timestamp(&row.created_at)?,
    })
}
