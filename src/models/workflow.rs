use serde::{Deserialize, Serialize};

/// Five independent per-patient gates. Each is driven by its own operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub hospital_summary_done: bool,
    pub ai_generation_done: bool,
    pub qc_analysis_done: bool,
    pub qc_clearance_done: bool,
    pub final_approval_done: bool,
}

impl WorkflowState {
    pub fn completed_steps(&self) -> usize {
        [
            self.hospital_summary_done,
            self.ai_generation_done,
            self.qc_analysis_done,
            self.qc_clearance_done,
            self.final_approval_done,
        ]
        .iter()
        .filter(|done| **done)
        .count()
    }

    pub fn apply(&mut self, patch: &WorkflowPatch) {
        if let Some(v) = patch.hospital_summary_done {
            self.hospital_summary_done = v;
        }
        if let Some(v) = patch.ai_generation_done {
            self.ai_generation_done = v;
        }
        if let Some(v) = patch.qc_analysis_done {
            self.qc_analysis_done = v;
        }
        if let Some(v) = patch.qc_clearance_done {
            self.qc_clearance_done = v;
        }
        if let Some(v) = patch.final_approval_done {
            self.final_approval_done = v;
        }
    }
}

/// Partial update of a workflow row. Only `Some` gates are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowPatch {
    pub hospital_summary_done: Option<bool>,
    pub ai_generation_done: Option<bool>,
    pub qc_analysis_done: Option<bool>,
    pub qc_clearance_done: Option<bool>,
    pub final_approval_done: Option<bool>,
}

impl WorkflowPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
