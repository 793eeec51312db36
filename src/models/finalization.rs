use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Bedside checklist captured when a nurse finalizes the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationData {
    pub teachback_completed: bool,
    pub caregiver_present: bool,
    pub interpreter_used: bool,
    /// 1 (low) to 5 (high).
    pub nurse_confidence: u8,
    pub finalized_at: Option<NaiveDateTime>,
}

impl FinalizationData {
    pub const MIN_CONFIDENCE: u8 = 1;
    pub const MAX_CONFIDENCE: u8 = 5;

    pub fn confidence_in_range(&self) -> bool {
        (Self::MIN_CONFIDENCE..=Self::MAX_CONFIDENCE).contains(&self.nurse_confidence)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub patient_id: Option<String>,
    pub timestamp: String,
    pub message: String,
}
