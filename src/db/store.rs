//! Persistence interface consumed by the pipeline, and its SQLite implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Everything the pipeline reads or writes. Implementations must make each
/// method atomic on its own; the pipeline serializes per patient on top.
pub trait DischargeStore: Send + Sync {
    fn insert_patient(&self, patient: &Patient) -> Result<(), DatabaseError>;
    fn patient(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError>;
    fn list_patients(&self) -> Result<Vec<Patient>, DatabaseError>;
    fn update_patient(&self, id: &Uuid, patch: &PatientPatch) -> Result<(), DatabaseError>;

    fn save_inpatient_record(
        &self,
        patient_id: &Uuid,
        record: &InpatientRecord,
    ) -> Result<(), DatabaseError>;
    fn inpatient_record(&self, patient_id: &Uuid) -> Result<Option<InpatientRecord>, DatabaseError>;

    /// Supersede the current plan and write all six sections atomically,
    /// together with `ai_generation_done` and a reset to unreviewed YELLOW.
    fn create_plan(
        &self,
        patient_id: &Uuid,
        options: &PlanOptions,
        sections: &SectionMap,
    ) -> Result<Plan, DatabaseError>;
    fn current_plan(&self, patient_id: &Uuid) -> Result<Option<Plan>, DatabaseError>;
    fn plan_history(&self, patient_id: &Uuid) -> Result<Vec<Plan>, DatabaseError>;
    fn sections(&self, plan_id: &Uuid) -> Result<SectionMap, DatabaseError>;
    /// Overwrite an existing section; `false` when the plan lacks it.
    fn write_section(
        &self,
        plan_id: &Uuid,
        name: SectionName,
        content: &str,
    ) -> Result<bool, DatabaseError>;

    /// Batch-resolve the patient's open flags and insert `findings` in one step.
    fn replace_unresolved_flags(
        &self,
        patient_id: &Uuid,
        plan_id: &Uuid,
        findings: &[QcFinding],
    ) -> Result<Vec<QcFlag>, DatabaseError>;
    fn insert_flags(
        &self,
        patient_id: &Uuid,
        plan_id: &Uuid,
        findings: &[QcFinding],
    ) -> Result<Vec<QcFlag>, DatabaseError>;
    fn flag(&self, flag_id: &Uuid) -> Result<Option<QcFlag>, DatabaseError>;
    fn flags(&self, patient_id: &Uuid, resolved: Option<bool>) -> Result<Vec<QcFlag>, DatabaseError>;
    /// `false` when the flag was already resolved.
    fn resolve_flag(&self, flag_id: &Uuid) -> Result<bool, DatabaseError>;

    fn workflow(&self, patient_id: &Uuid) -> Result<Option<WorkflowState>, DatabaseError>;
    fn update_workflow(&self, patient_id: &Uuid, patch: &WorkflowPatch) -> Result<(), DatabaseError>;
    /// Patient QC status and clearance gate, written together.
    fn write_qc_assessment(
        &self,
        patient_id: &Uuid,
        status: Severity,
        clearance: bool,
        analysis_done: bool,
    ) -> Result<(), DatabaseError>;

    /// Finalization row, `final_approval_done` and `Finalized` status, written together.
    fn finalize(&self, patient_id: &Uuid, data: &FinalizationData) -> Result<(), DatabaseError>;
    fn finalization(&self, patient_id: &Uuid) -> Result<Option<FinalizationData>, DatabaseError>;

    fn record_audit(&self, patient_id: Option<&Uuid>, message: &str) -> Result<(), DatabaseError>;
    fn audit_events(&self, patient_id: &Uuid, limit: usize) -> Result<Vec<AuditEvent>, DatabaseError>;
}

/// `DischargeStore` over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl DischargeStore for SqliteStore {
    fn insert_patient(&self, patient: &Patient) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_patient(&conn, patient)
    }

    fn patient(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_patient(&conn, id)
    }

    fn list_patients(&self) -> Result<Vec<Patient>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_patients(&conn)
    }

    fn update_patient(&self, id: &Uuid, patch: &PatientPatch) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::update_patient(&conn, id, patch)
    }

    fn save_inpatient_record(
        &self,
        patient_id: &Uuid,
        record: &InpatientRecord,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_inpatient_record(&conn, patient_id, record)
    }

    fn inpatient_record(&self, patient_id: &Uuid) -> Result<Option<InpatientRecord>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_latest_inpatient_record(&conn, patient_id)
    }

    fn create_plan(
        &self,
        patient_id: &Uuid,
        options: &PlanOptions,
        sections: &SectionMap,
    ) -> Result<Plan, DatabaseError> {
        let conn = self.conn()?;
        repository::create_plan_with_sections(&conn, patient_id, options, sections)
    }

    fn current_plan(&self, patient_id: &Uuid) -> Result<Option<Plan>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_current_plan(&conn, patient_id)
    }

    fn plan_history(&self, patient_id: &Uuid) -> Result<Vec<Plan>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_plan_history(&conn, patient_id)
    }

    fn sections(&self, plan_id: &Uuid) -> Result<SectionMap, DatabaseError> {
        let conn = self.conn()?;
        repository::get_plan_sections(&conn, plan_id)
    }

    fn write_section(
        &self,
        plan_id: &Uuid,
        name: SectionName,
        content: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        repository::update_section_content(&conn, plan_id, name, content)
    }

    fn replace_unresolved_flags(
        &self,
        patient_id: &Uuid,
        plan_id: &Uuid,
        findings: &[QcFinding],
    ) -> Result<Vec<QcFlag>, DatabaseError> {
        let (superseded, flags) = {
            let conn = self.conn()?;
            repository::replace_unresolved_flags(&conn, patient_id, plan_id, findings)?
        };
        tracing::debug!(
            patient_id = %patient_id,
            superseded,
            inserted = flags.len(),
            "QC flags replaced"
        );
        Ok(flags)
    }

    fn insert_flags(
        &self,
        patient_id: &Uuid,
        plan_id: &Uuid,
        findings: &[QcFinding],
    ) -> Result<Vec<QcFlag>, DatabaseError> {
        let conn = self.conn()?;
        repository::insert_qc_flags(&conn, patient_id, plan_id, findings)
    }

    fn flag(&self, flag_id: &Uuid) -> Result<Option<QcFlag>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_qc_flag(&conn, flag_id)
    }

    fn flags(&self, patient_id: &Uuid, resolved: Option<bool>) -> Result<Vec<QcFlag>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_qc_flags(&conn, patient_id, resolved)
    }

    fn resolve_flag(&self, flag_id: &Uuid) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        repository::resolve_qc_flag(&conn, flag_id)
    }

    fn workflow(&self, patient_id: &Uuid) -> Result<Option<WorkflowState>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_workflow_state(&conn, patient_id)
    }

    fn update_workflow(&self, patient_id: &Uuid, patch: &WorkflowPatch) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::update_workflow_state(&conn, patient_id, patch)
    }

    fn write_qc_assessment(
        &self,
        patient_id: &Uuid,
        status: Severity,
        clearance: bool,
        analysis_done: bool,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::write_qc_assessment(&conn, patient_id, status, clearance, analysis_done)
    }

    fn finalize(&self, patient_id: &Uuid, data: &FinalizationData) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::finalize_plan(&conn, patient_id, data)
    }

    fn finalization(&self, patient_id: &Uuid) -> Result<Option<FinalizationData>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_latest_finalization(&conn, patient_id)
    }

    fn record_audit(&self, patient_id: Option<&Uuid>, message: &str) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_audit_event(&conn, patient_id, message)
    }

    fn audit_events(&self, patient_id: &Uuid, limit: usize) -> Result<Vec<AuditEvent>, DatabaseError> {
        let conn = self.conn()?;
        repository::recent_audit_events(&conn, patient_id, limit)
    }
}
