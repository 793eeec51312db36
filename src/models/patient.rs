use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Language, Severity, WorkflowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub mrn: String,
    pub language: Language,
    pub disposition: String,
    /// Derived from the unresolved flags of the current plan; YELLOW until
    /// the first QC run.
    pub qc_status: Severity,
    pub wf_status: WorkflowStatus,
    pub created_at: NaiveDateTime,
}

impl Patient {
    pub fn new(name: &str, mrn: &str, language: Language, disposition: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            mrn: mrn.to_string(),
            language,
            disposition: disposition.to_string(),
            qc_status: Severity::Yellow,
            wf_status: WorkflowStatus::Draft,
            created_at: chrono::Local::now().naive_local(),
        }
    }
}

/// Partial update of a patient row. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientPatch {
    pub name: Option<String>,
    pub mrn: Option<String>,
    pub language: Option<Language>,
    pub disposition: Option<String>,
    pub qc_status: Option<Severity>,
    pub wf_status: Option<WorkflowStatus>,
}

impl PatientPatch {
    pub fn qc_status(status: Severity) -> Self {
        Self {
            qc_status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
