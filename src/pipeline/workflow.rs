use uuid::Uuid;

use crate::db::DischargeStore;
use crate::models::enums::Severity;
use crate::models::{FinalizationData, WorkflowPatch, WorkflowState};

use super::severity::{assess, QcAssessment};
use super::PipelineError;

/// Operations that move a workflow gate. Each gate has exactly one owner;
/// nothing chains forward automatically. `ai_generation_done` is owned by
/// plan creation, which writes it with the plan itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    HospitalSummarySaved,
    Finalized,
}

impl GateEvent {
    pub fn patch(&self) -> WorkflowPatch {
        let mut patch = WorkflowPatch::default();
        match self {
            GateEvent::HospitalSummarySaved => patch.hospital_summary_done = Some(true),
            GateEvent::Finalized => patch.final_approval_done = Some(true),
        }
        patch
    }
}

/// Drives the five per-patient gates against a store. Callers hold the
/// patient's lock around every method that reads then writes.
pub struct WorkflowGate<'a> {
    store: &'a dyn DischargeStore,
}

impl<'a> WorkflowGate<'a> {
    pub fn new(store: &'a dyn DischargeStore) -> Self {
        Self { store }
    }

    pub fn state(&self, patient_id: &Uuid) -> Result<WorkflowState, PipelineError> {
        self.store
            .workflow(patient_id)?
            .ok_or(PipelineError::PatientNotFound(*patient_id))
    }

    /// Set the gate owned by `event`. Finalization goes through `finalize`.
    pub fn record(&self, patient_id: &Uuid, event: GateEvent) -> Result<(), PipelineError> {
        if event == GateEvent::Finalized {
            return Err(PipelineError::InvalidFinalization(
                "final approval is only set by finalize".into(),
            ));
        }
        self.store.update_workflow(patient_id, &event.patch())?;
        Ok(())
    }

    /// Re-derive patient QC status and `qc_clearance_done` from the open flags
    /// of the current plan, and store both. `qc_analysis_done` is set when
    /// `analysis_completed` is true.
    pub fn recompute(
        &self,
        patient_id: &Uuid,
        analysis_completed: bool,
    ) -> Result<QcAssessment, PipelineError> {
        let plan = self.store.current_plan(patient_id)?;
        let open = self.store.flags(patient_id, Some(false))?;
        let assessment = assess(&open, plan.as_ref().map(|p| &p.id));

        self.store.write_qc_assessment(
            patient_id,
            assessment.status,
            assessment.clearance,
            analysis_completed,
        )?;

        tracing::info!(
            patient_id = %patient_id,
            status = %assessment.status,
            clearance = assessment.clearance,
            open_flags = open.len(),
            "QC status recomputed"
        );
        Ok(assessment)
    }

    /// The status finalization is judged on: the stored patient status and a
    /// fresh aggregate over the open flags, whichever is more critical.
    pub fn effective_status(&self, patient_id: &Uuid) -> Result<Severity, PipelineError> {
        let patient = self
            .store
            .patient(patient_id)?
            .ok_or(PipelineError::PatientNotFound(*patient_id))?;
        let plan = self.store.current_plan(patient_id)?;
        let open = self.store.flags(patient_id, Some(false))?;
        let fresh = assess(&open, plan.as_ref().map(|p| &p.id));
        Ok(patient.qc_status.max(fresh.status))
    }

    /// Close the workflow. Refuses, without writing anything, unless the
    /// effective QC status is GREEN and the checklist is valid.
    pub fn finalize(&self, patient_id: &Uuid, data: &FinalizationData) -> Result<(), PipelineError> {
        let status = self.effective_status(patient_id)?;
        if status != Severity::Green {
            tracing::warn!(patient_id = %patient_id, status = %status, "Finalization refused");
            return Err(PipelineError::FinalizePrecondition { status });
        }
        if !data.confidence_in_range() {
            return Err(PipelineError::InvalidFinalization(format!(
                "nurse confidence must be {}-{}, got {}",
                FinalizationData::MIN_CONFIDENCE,
                FinalizationData::MAX_CONFIDENCE,
                data.nurse_confidence
            )));
        }
        self.store.finalize(patient_id, data)?;
        Ok(())
    }
}
