use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::Language;
use super::patient::Patient;

/// Inpatient findings recorded before discharge planning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InpatientRecord {
    pub stroke_type: String,
    pub fall_risk: String,
    pub dysphagia_result: String,
    pub anticoagulant: bool,
    pub hospital_summary: String,
    pub recorded_at: Option<NaiveDateTime>,
}

/// Immutable input to prompt construction: patient demographics plus the
/// latest inpatient record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalContext {
    pub patient_name: String,
    pub mrn: String,
    pub language: Language,
    pub disposition: String,
    pub stroke_type: String,
    pub fall_risk: String,
    pub dysphagia_result: String,
    pub anticoagulant: bool,
    pub hospital_summary: String,
}

impl ClinicalContext {
    pub fn new(patient: &Patient, record: &InpatientRecord) -> Self {
        Self {
            patient_name: patient.name.clone(),
            mrn: patient.mrn.clone(),
            language: patient.language,
            disposition: patient.disposition.clone(),
            stroke_type: record.stroke_type.clone(),
            fall_risk: record.fall_risk.clone(),
            dysphagia_result: record.dysphagia_result.clone(),
            anticoagulant: record.anticoagulant,
            hospital_summary: record.hospital_summary.clone(),
        }
    }

    pub fn anticoagulant_label(&self) -> &'static str {
        if self.anticoagulant {
            "Yes"
        } else {
            "No"
        }
    }
}
