use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{SectionName, Severity};

/// A persisted QC finding, tied to the plan that was current when QC ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcFlag {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub plan_id: Uuid,
    pub flag_type: String,
    pub severity: Severity,
    pub message: String,
    pub suggested_fix: String,
    /// `None` when the reviewer named no (or no valid) section.
    pub target_section: Option<SectionName>,
    pub resolved: bool,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

/// A finding produced by the QC engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcFinding {
    pub flag_type: String,
    pub severity: Severity,
    pub message: String,
    pub suggested_fix: String,
    pub target_section: Option<SectionName>,
}

impl QcFinding {
    /// Recorded when the QC response could not be parsed. Keeps the patient
    /// out of GREEN until a human resolves it or QC is re-run.
    pub fn unparseable_review() -> Self {
        Self {
            flag_type: "System - QC Unparseable".into(),
            severity: Severity::Yellow,
            message: "The automated QC response could not be parsed. Manual review is required.".into(),
            suggested_fix: String::new(),
            target_section: None,
        }
    }

    /// Recorded when the automatic QC call after generation failed outright.
    pub fn review_failed() -> Self {
        Self {
            flag_type: "System - QC Failed".into(),
            severity: Severity::Yellow,
            message: "The automated QC review did not complete. Re-run QC or review the plan manually.".into(),
            suggested_fix: String::new(),
            target_section: None,
        }
    }
}

/// Per-severity counts for the QC review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcSummary {
    pub status: Severity,
    pub unresolved_red: usize,
    pub unresolved_yellow: usize,
    pub unresolved_green: usize,
    pub resolved: usize,
}
