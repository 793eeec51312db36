//! Per-patient critical section for pipeline operations.
//!
//! Every operation that reads flags and writes back status or gates holds the
//! patient's slot for its whole duration. Different patients never contend.
//!
//! ```ignore
//! let slot = locks.slot(&patient_id)?;
//! let _guard = slot.acquire(OperationKind::QcReview)?;
//! // ... read flags, aggregate, write status ... guard dropped here
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::PipelineError;

/// What kind of pipeline operation holds a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    HospitalSummary,
    PlanGeneration,
    QcReview,
    Expansion,
    ApplySuggestion,
    ResolveFlag,
    SectionEdit,
    Finalization,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HospitalSummary => write!(f, "Hospital summary"),
            Self::PlanGeneration => write!(f, "Plan generation"),
            Self::QcReview => write!(f, "QC review"),
            Self::Expansion => write!(f, "Suggestion expansion"),
            Self::ApplySuggestion => write!(f, "Apply suggestion"),
            Self::ResolveFlag => write!(f, "Resolve flag"),
            Self::SectionEdit => write!(f, "Section edit"),
            Self::Finalization => write!(f, "Finalization"),
        }
    }
}

/// Snapshot of the operation currently holding a patient.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    /// When the operation started (ISO 8601).
    pub started_at: String,
}

/// Exclusive-access slot for one patient.
#[derive(Default)]
pub struct PatientSlot {
    lock: Mutex<()>,
    current_op: Mutex<Option<ActiveOperation>>,
}

impl PatientSlot {
    /// Block until the patient is free.
    pub fn acquire(&self, kind: OperationKind) -> Result<PatientGuard<'_>, PipelineError> {
        let guard = self.lock.lock().map_err(|_| PipelineError::LockPoisoned)?;
        self.set_current_op(kind);
        Ok(PatientGuard {
            _guard: guard,
            slot: self,
        })
    }

    /// Non-blocking variant. `None` if another operation holds the patient.
    pub fn try_acquire(&self, kind: OperationKind) -> Option<PatientGuard<'_>> {
        let guard = self.lock.try_lock().ok()?;
        self.set_current_op(kind);
        Some(PatientGuard {
            _guard: guard,
            slot: self,
        })
    }

    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.current_op.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    fn set_current_op(&self, kind: OperationKind) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = Some(ActiveOperation {
                kind,
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }

    fn clear_current_op(&self) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = None;
        }
    }
}

/// RAII guard. Dropping it releases the patient and clears the current operation.
pub struct PatientGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    slot: &'a PatientSlot,
}

impl Drop for PatientGuard<'_> {
    fn drop(&mut self) {
        self.slot.clear_current_op();
    }
}

/// Lazily-populated table of patient slots.
#[derive(Default)]
pub struct PatientLocks {
    slots: Mutex<HashMap<Uuid, Arc<PatientSlot>>>,
}

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for a patient, created on first use.
    pub fn slot(&self, patient_id: &Uuid) -> Result<Arc<PatientSlot>, PipelineError> {
        let mut slots = self.slots.lock().map_err(|_| PipelineError::LockPoisoned)?;
        Ok(Arc::clone(slots.entry(*patient_id).or_default()))
    }

    /// What is running for a patient, if anything.
    pub fn current_operation(&self, patient_id: &Uuid) -> Option<ActiveOperation> {
        let slots = self.slots.lock().ok()?;
        slots.get(patient_id)?.current_operation()
    }
}
