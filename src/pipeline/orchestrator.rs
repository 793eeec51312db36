use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::db::DischargeStore;
use crate::models::enums::SectionName;
use crate::models::{
    ClinicalContext, FinalizationData, InpatientRecord, Patient, Plan, PlanOptions, QcFinding,
    QcFlag, QcSummary, SectionMap,
};
use crate::patient_lock::{OperationKind, PatientLocks};

use super::apply::{self, ApplyOutcome, ExpansionProposal};
use super::client::{LlmClient, OpenAiClient};
use super::parser::parse_sections;
use super::prompt::build_generation_prompt;
use super::qc::{review_plan, QcReview};
use super::retry::TextServiceClient;
use super::sanitize::strip_section_headers;
use super::severity::{summarize, QcAssessment};
use super::workflow::{GateEvent, WorkflowGate};
use super::{Advisory, PipelineError};

/// Options for one Generate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    pub patient_id: Uuid,
    pub options: PlanOptions,
}

impl PlanRequest {
    pub fn new(patient_id: Uuid) -> Self {
        Self {
            patient_id,
            options: PlanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct QcOutcome {
    pub plan_id: Uuid,
    pub flags: Vec<QcFlag>,
    pub assessment: QcAssessment,
    pub advisory: Option<Advisory>,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub plan: Plan,
    pub sections: SectionMap,
    pub flags: Vec<QcFlag>,
    pub assessment: QcAssessment,
    pub advisories: Vec<Advisory>,
}

/// Everything an exporter needs to render the plan.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub patient: Patient,
    pub context: ClinicalContext,
    pub plan: Plan,
    pub sections: SectionMap,
    pub finalization: Option<FinalizationData>,
}

/// Renders an export bundle (PDF, print view, ...). Not shipped here.
pub trait PlanExporter {
    type Error: std::error::Error;

    fn render(&self, bundle: &ExportBundle) -> Result<Vec<u8>, Self::Error>;
}

/// Runs the plan pipeline for many patients, one operation per patient at a time.
pub struct DischargePipeline {
    service: TextServiceClient,
    store: Box<dyn DischargeStore>,
    locks: PatientLocks,
}

impl DischargePipeline {
    pub fn new(
        llm: Box<dyn LlmClient + Send + Sync>,
        store: Box<dyn DischargeStore>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            service: TextServiceClient::new(llm, &config.model, config.retry.clone()),
            store,
            locks: PatientLocks::new(),
        }
    }

    /// Pipeline backed by the configured chat-completions service.
    pub fn from_config(
        config: &ServiceConfig,
        store: Box<dyn DischargeStore>,
    ) -> Result<Self, PipelineError> {
        let client = OpenAiClient::new(config).map_err(|source| PipelineError::Service {
            attempts: 0,
            source,
        })?;
        Ok(Self::new(Box::new(client), store, config))
    }

    pub fn store(&self) -> &dyn DischargeStore {
        self.store.as_ref()
    }

    pub fn locks(&self) -> &PatientLocks {
        &self.locks
    }

    fn gate(&self) -> WorkflowGate<'_> {
        WorkflowGate::new(self.store.as_ref())
    }

    /// Audit writes are best-effort: a failed write never fails the operation.
    fn audit(&self, patient_id: &Uuid, message: &str) {
        if let Err(e) = self.store.record_audit(Some(patient_id), message) {
            tracing::warn!(patient_id = %patient_id, error = %e, "Audit write failed");
        }
    }

    fn load_patient(&self, patient_id: &Uuid) -> Result<Patient, PipelineError> {
        self.store
            .patient(patient_id)?
            .ok_or(PipelineError::PatientNotFound(*patient_id))
    }

    fn load_context(&self, patient_id: &Uuid) -> Result<(Patient, ClinicalContext), PipelineError> {
        let patient = self.load_patient(patient_id)?;
        let record = self
            .store
            .inpatient_record(patient_id)?
            .ok_or(PipelineError::NoClinicalContext(*patient_id))?;
        let context = ClinicalContext::new(&patient, &record);
        Ok((patient, context))
    }

    fn load_current_plan(&self, patient_id: &Uuid) -> Result<Plan, PipelineError> {
        self.store
            .current_plan(patient_id)?
            .ok_or(PipelineError::NoCurrentPlan(*patient_id))
    }

    /// Register a patient with their inpatient findings.
    pub fn admit_patient(
        &self,
        patient: &Patient,
        record: &InpatientRecord,
    ) -> Result<(), PipelineError> {
        self.store.insert_patient(patient)?;
        self.store.save_inpatient_record(&patient.id, record)?;
        if !record.hospital_summary.trim().is_empty() {
            self.gate().record(&patient.id, GateEvent::HospitalSummarySaved)?;
        }
        self.audit(&patient.id, "Patient admitted to discharge planning");
        tracing::info!(patient_id = %patient.id, "Patient admitted");
        Ok(())
    }

    /// Store a new inpatient record carrying a non-empty hospital summary.
    pub fn save_hospital_summary(
        &self,
        patient_id: &Uuid,
        record: &InpatientRecord,
    ) -> Result<(), PipelineError> {
        let _span = tracing::info_span!("save_hospital_summary", patient_id = %patient_id).entered();
        if record.hospital_summary.trim().is_empty() {
            return Err(PipelineError::EmptyHospitalSummary);
        }
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::HospitalSummary)?;

        self.load_patient(patient_id)?;
        self.store.save_inpatient_record(patient_id, record)?;
        self.gate().record(patient_id, GateEvent::HospitalSummarySaved)?;
        self.audit(patient_id, "Hospital summary saved");
        Ok(())
    }

    /// Generate, parse and store a new plan version, then run QC on it.
    ///
    /// Any failure before the plan is stored leaves no trace. A QC service
    /// failure afterwards keeps the plan and records a YELLOW review flag.
    pub fn generate(&self, request: &PlanRequest) -> Result<GenerateOutcome, PipelineError> {
        let patient_id = request.patient_id;
        let _span = tracing::info_span!("generate_plan", patient_id = %patient_id).entered();
        let slot = self.locks.slot(&patient_id)?;
        let _guard = slot.acquire(OperationKind::PlanGeneration)?;

        let (_, context) = self.load_context(&patient_id)?;
        let prompt = build_generation_prompt(&context, &request.options);
        let response = self.service.call(&prompt)?;
        let sections = parse_sections(&response)?;

        // Also sets ai_generation_done and holds the patient at YELLOW until
        // the QC pass below completes.
        let plan = self.store.create_plan(&patient_id, &request.options, &sections)?;
        tracing::info!(
            plan_id = %plan.id,
            version = plan.version,
            completed_sections = sections.completed_count(),
            "Discharge plan stored"
        );
        self.audit(
            &patient_id,
            &format!(
                "Discharge plan v{} generated ({}/{} sections)",
                plan.version,
                sections.completed_count(),
                SectionName::ALL.len()
            ),
        );

        let mut advisories = Vec::new();
        let (flags, assessment) = match self.review_current_plan(&patient_id, &context, &plan) {
            Ok(qc) => {
                advisories.extend(qc.advisory);
                (qc.flags, qc.assessment)
            }
            Err(PipelineError::Service { attempts, source }) => {
                tracing::warn!(
                    plan_id = %plan.id,
                    attempts,
                    error = %source,
                    "Automatic QC failed after generation, defaulting to YELLOW"
                );
                let flags = self.store.replace_unresolved_flags(
                    &patient_id,
                    &plan.id,
                    &[QcFinding::review_failed()],
                )?;
                let assessment = self.gate().recompute(&patient_id, false)?;
                self.audit(&patient_id, "Automatic QC review failed; manual review required");
                advisories.push(Advisory::QcReviewFailed { attempts });
                (flags, assessment)
            }
            Err(e) => return Err(e),
        };

        Ok(GenerateOutcome {
            plan,
            sections,
            flags,
            assessment,
            advisories,
        })
    }

    /// QC body shared by `generate` and `run_qc`. Caller holds the patient lock.
    fn review_current_plan(
        &self,
        patient_id: &Uuid,
        context: &ClinicalContext,
        plan: &Plan,
    ) -> Result<QcOutcome, PipelineError> {
        let sections = self.store.sections(&plan.id)?;
        let review = review_plan(&self.service, context, &sections)?;

        let (findings, advisory) = match review {
            QcReview::Findings(findings) => (findings, None),
            QcReview::Degraded { response_len, .. } => (
                vec![QcFinding::unparseable_review()],
                Some(Advisory::QcResponseUnparseable { response_len }),
            ),
        };

        let flags = self
            .store
            .replace_unresolved_flags(patient_id, &plan.id, &findings)?;
        let assessment = self.gate().recompute(patient_id, true)?;

        tracing::info!(
            plan_id = %plan.id,
            flags = flags.len(),
            degraded = advisory.is_some(),
            status = %assessment.status,
            "QC review completed"
        );
        self.audit(
            patient_id,
            &format!(
                "QC review of plan v{}: {} flag(s), status {}",
                plan.version,
                flags.len(),
                assessment.status
            ),
        );

        Ok(QcOutcome {
            plan_id: plan.id,
            flags,
            assessment,
            advisory,
        })
    }

    /// Re-run QC on the current plan, superseding every open flag.
    pub fn run_qc(&self, patient_id: &Uuid) -> Result<QcOutcome, PipelineError> {
        let _span = tracing::info_span!("run_qc", patient_id = %patient_id).entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::QcReview)?;

        let (_, context) = self.load_context(patient_id)?;
        let plan = self.load_current_plan(patient_id)?;
        self.review_current_plan(patient_id, &context, &plan)
    }

    /// Regenerated section text for an open flag. Nothing is stored.
    ///
    /// `fix_text` overrides the flag's own `suggested_fix`.
    pub fn propose_expansion(
        &self,
        patient_id: &Uuid,
        flag_id: &Uuid,
        fix_text: Option<&str>,
    ) -> Result<ExpansionProposal, PipelineError> {
        let _span = tracing::info_span!("propose_expansion", patient_id = %patient_id, flag_id = %flag_id)
            .entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::Expansion)?;

        let flag = apply::load_open_flag(self.store.as_ref(), patient_id, flag_id)?;
        let (_, context) = self.load_context(patient_id)?;
        let plan = self.load_current_plan(patient_id)?;
        let sections = self.store.sections(&flag.plan_id)?;

        let proposal = apply::propose_expansion(
            &self.service,
            &context,
            &plan.options,
            &sections,
            &flag,
            fix_text.unwrap_or(flag.suggested_fix.as_str()),
        )?;
        self.audit(patient_id, &format!("Expansion proposed for QC flag {flag_id}"));
        Ok(proposal)
    }

    /// Commit reviewed content for an open flag and resolve it.
    pub fn apply_suggestion(
        &self,
        patient_id: &Uuid,
        flag_id: &Uuid,
        content: &str,
    ) -> Result<ApplyOutcome, PipelineError> {
        let _span = tracing::info_span!("apply_suggestion", patient_id = %patient_id, flag_id = %flag_id)
            .entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::ApplySuggestion)?;

        let flag = apply::load_open_flag(self.store.as_ref(), patient_id, flag_id)?;
        let outcome = apply::apply_suggestion(self.store.as_ref(), &flag, content)?;

        let target = flag.target_section.map(|s| s.as_str()).unwrap_or("none");
        let message = if outcome.written {
            format!("QC fix applied to {target}; flag {flag_id} resolved")
        } else {
            format!("QC flag {flag_id} resolved; target section {target} missing, nothing written")
        };
        self.audit(patient_id, &message);
        Ok(outcome)
    }

    /// Resolve an open flag without writing any content.
    pub fn mark_resolved(
        &self,
        patient_id: &Uuid,
        flag_id: &Uuid,
    ) -> Result<QcAssessment, PipelineError> {
        let _span = tracing::info_span!("mark_resolved", patient_id = %patient_id, flag_id = %flag_id)
            .entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::ResolveFlag)?;

        let flag = apply::load_open_flag(self.store.as_ref(), patient_id, flag_id)?;
        let assessment = apply::resolve_and_recompute(self.store.as_ref(), &flag)?;
        self.audit(patient_id, &format!("QC flag {flag_id} marked resolved"));
        Ok(assessment)
    }

    /// Manual editor save: overwrite one section of the current plan. Flags
    /// are left as they are.
    pub fn edit_section(
        &self,
        patient_id: &Uuid,
        section: SectionName,
        content: &str,
    ) -> Result<(), PipelineError> {
        let _span = tracing::info_span!("edit_section", patient_id = %patient_id, section = section.as_str())
            .entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::SectionEdit)?;

        let plan = self.load_current_plan(patient_id)?;
        let sanitized = strip_section_headers(content);
        if !self.store.write_section(&plan.id, section, &sanitized)? {
            return Err(PipelineError::Database(crate::db::DatabaseError::NotFound {
                entity_type: "PlanSection".into(),
                id: format!("{}/{}", plan.id, section.as_str()),
            }));
        }
        self.audit(patient_id, &format!("Section {} edited", section.as_str()));
        Ok(())
    }

    /// Close the workflow. Refused unless QC status is GREEN; a refusal
    /// writes nothing.
    pub fn finalize(&self, patient_id: &Uuid, data: &FinalizationData) -> Result<(), PipelineError> {
        let _span = tracing::info_span!("finalize", patient_id = %patient_id).entered();
        let slot = self.locks.slot(patient_id)?;
        let _guard = slot.acquire(OperationKind::Finalization)?;

        self.load_current_plan(patient_id)?;
        self.gate().finalize(patient_id, data)?;
        tracing::info!(nurse_confidence = data.nurse_confidence, "Discharge plan finalized");
        self.audit(
            patient_id,
            &format!(
                "Plan finalized (teach-back: {}, caregiver: {}, interpreter: {}, confidence: {})",
                data.teachback_completed,
                data.caregiver_present,
                data.interpreter_used,
                data.nurse_confidence
            ),
        );
        Ok(())
    }

    /// Counts for the QC review screen.
    pub fn qc_summary(&self, patient_id: &Uuid) -> Result<QcSummary, PipelineError> {
        self.load_patient(patient_id)?;
        let plan = self.store.current_plan(patient_id)?;
        let flags = self.store.flags(patient_id, None)?;
        Ok(summarize(&flags, plan.as_ref().map(|p| &p.id)))
    }

    /// Input for a `PlanExporter`.
    pub fn export_bundle(&self, patient_id: &Uuid) -> Result<ExportBundle, PipelineError> {
        let (patient, context) = self.load_context(patient_id)?;
        let plan = self.load_current_plan(patient_id)?;
        let sections = self.store.sections(&plan.id)?;
        let finalization = self.store.finalization(patient_id)?;
        self.audit(patient_id, &format!("Plan v{} exported", plan.version));
        Ok(ExportBundle {
            patient,
            context,
            plan,
            sections,
            finalization,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::db::SqliteStore;
    use crate::models::enums::{Language, Severity, WorkflowStatus};
    use crate::pipeline::client::ScriptedLlmClient;
    use crate::pipeline::parser::placeholder_for;
    use crate::pipeline::retry::RetryPolicy;
    use crate::pipeline::LlmError;

    const CLEAN_QC: &str = "```json\n[]\n```";
    const RED_QC: &str = r#"[{"flag_type": "Safety - Anticoagulant", "severity": "RED",
        "message": "Bleeding precautions missing.",
        "suggested_fix": "Watch for unusual bleeding or black stools.",
        "target_section": "Warning Signs"}]"#;
    const YELLOW_QC: &str = r#"[{"flag_type": "Completeness", "severity": "YELLOW",
        "message": "No follow-up date.", "suggested_fix": "", "target_section": "follow-ups"}]"#;
    const EXPANDED_WARNING_SIGNS: &str = "```\n===WARNING SIGNS===\n- Call 911 for sudden weakness.\n- Watch for unusual bleeding or black stools.\n```";

    fn full_plan() -> String {
        SectionName::ALL
            .iter()
            .map(|n| format!("{}\n- {} guidance\n", n.marker(), n.as_str()))
            .collect()
    }

    fn pipeline(llm: &Arc<ScriptedLlmClient>) -> DischargePipeline {
        let config = ServiceConfig {
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::ZERO,
            },
            ..ServiceConfig::default()
        };
        let store = SqliteStore::open_in_memory().unwrap();
        DischargePipeline::new(Box::new(Arc::clone(llm)), Box::new(store), &config)
    }

    fn record(summary: &str) -> InpatientRecord {
        InpatientRecord {
            stroke_type: "Ischemic".into(),
            fall_risk: "High".into(),
            dysphagia_result: "Pass".into(),
            anticoagulant: true,
            hospital_summary: summary.into(),
            recorded_at: None,
        }
    }

    fn admit(pipeline: &DischargePipeline) -> Uuid {
        let patient = Patient::new("Ann Lee", "MRN-42", Language::En, "Home with caregiver");
        pipeline
            .admit_patient(&patient, &record("Left MCA stroke, started apixaban."))
            .unwrap();
        patient.id
    }

    fn checklist() -> FinalizationData {
        FinalizationData {
            teachback_completed: true,
            caregiver_present: true,
            interpreter_used: false,
            nurse_confidence: 4,
            finalized_at: None,
        }
    }

    #[test]
    fn missing_section_gets_placeholder_and_clean_qc_clears() {
        let response: String = SectionName::ALL
            .iter()
            .filter(|n| **n != SectionName::Diet)
            .map(|n| format!("{}\n- {} guidance\n", n.marker(), n.as_str()))
            .collect();
        let llm = Arc::new(ScriptedLlmClient::replies(&[&response, CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let outcome = p.generate(&PlanRequest::new(id)).unwrap();

        assert_eq!(outcome.plan.version, 1);
        assert_eq!(outcome.sections.len(), 6);
        assert_eq!(
            outcome.sections.get(SectionName::Diet),
            Some(placeholder_for(SectionName::Diet).as_str())
        );
        assert!(outcome.flags.is_empty());
        assert!(outcome.advisories.is_empty());
        assert_eq!(outcome.assessment.status, Severity::Green);
        assert!(outcome.assessment.clearance);

        let state = p.store().workflow(&id).unwrap().unwrap();
        assert!(state.hospital_summary_done);
        assert!(state.ai_generation_done);
        assert!(state.qc_analysis_done);
        assert!(state.qc_clearance_done);
        assert!(!state.final_approval_done);
        assert_eq!(llm.call_count(), 2);
    }

    #[test]
    fn red_flag_expanded_and_applied_clears_the_patient() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[
            &full_plan(),
            RED_QC,
            EXPANDED_WARNING_SIGNS,
        ]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let outcome = p.generate(&PlanRequest::new(id)).unwrap();
        assert_eq!(outcome.assessment.status, Severity::Red);
        assert!(!outcome.assessment.clearance);
        let flag = outcome.flags[0].clone();
        assert_eq!(flag.target_section, Some(SectionName::WarningSigns));

        let proposal = p.propose_expansion(&id, &flag.id, None).unwrap();
        assert!(proposal.expanded);
        assert!(proposal.content.contains("black stools"));
        assert!(!proposal.content.contains("==="));

        // Proposing commits nothing.
        assert_eq!(p.qc_summary(&id).unwrap().status, Severity::Red);
        let before = p.store().sections(&outcome.plan.id).unwrap();
        assert_eq!(before, outcome.sections);

        let applied = p.apply_suggestion(&id, &flag.id, &proposal.content).unwrap();
        assert!(applied.written);
        assert_eq!(applied.assessment.status, Severity::Green);
        assert!(applied.assessment.clearance);

        let after = p.store().sections(&outcome.plan.id).unwrap();
        assert!(after
            .get(SectionName::WarningSigns)
            .unwrap()
            .contains("black stools"));
        assert_eq!(after.get(SectionName::Diet), outcome.sections.get(SectionName::Diet));

        let again = p.apply_suggestion(&id, &flag.id, &proposal.content);
        assert!(matches!(again, Err(PipelineError::FlagAlreadyResolved(f)) if f == flag.id));
    }

    #[test]
    fn generation_failure_leaves_no_trace() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(LlmError::Api {
            status: 503,
            body: "overloaded".into(),
        })]));
        let p = pipeline(&llm);
        let id = admit(&p);
        let audit_before = p.store().audit_events(&id, 50).unwrap().len();

        let result = p.generate(&PlanRequest::new(id));

        assert!(matches!(result, Err(PipelineError::Service { attempts: 3, .. })));
        assert_eq!(llm.call_count(), 3);
        assert!(p.store().current_plan(&id).unwrap().is_none());
        assert!(p.store().flags(&id, None).unwrap().is_empty());
        let state = p.store().workflow(&id).unwrap().unwrap();
        assert!(!state.ai_generation_done);
        assert_eq!(p.store().audit_events(&id, 50).unwrap().len(), audit_before);
    }

    #[test]
    fn qc_failure_after_generation_keeps_plan_and_holds_yellow() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(full_plan()),
            Err(LlmError::Connection("http://localhost:9".into())),
        ]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let outcome = p.generate(&PlanRequest::new(id)).unwrap();

        assert_eq!(outcome.advisories, vec![Advisory::QcReviewFailed { attempts: 3 }]);
        assert_eq!(outcome.flags.len(), 1);
        assert_eq!(outcome.flags[0].severity, Severity::Yellow);
        assert_eq!(outcome.assessment.status, Severity::Yellow);
        assert!(p.store().current_plan(&id).unwrap().is_some());

        let state = p.store().workflow(&id).unwrap().unwrap();
        assert!(state.ai_generation_done);
        assert!(!state.qc_analysis_done);
        assert!(!state.qc_clearance_done);
        assert_eq!(llm.call_count(), 4);
    }

    #[test]
    fn unparseable_qc_degrades_to_manual_review() {
        let prose = "I reviewed the plan and it looks fine overall.";
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), prose, CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let outcome = p.generate(&PlanRequest::new(id)).unwrap();
        assert_eq!(
            outcome.advisories,
            vec![Advisory::QcResponseUnparseable {
                response_len: prose.len()
            }]
        );
        assert_eq!(outcome.flags[0].flag_type, "System - QC Unparseable");
        assert_eq!(outcome.assessment.status, Severity::Yellow);
        assert!(p.store().workflow(&id).unwrap().unwrap().qc_analysis_done);

        // A clean re-run supersedes the synthetic flag.
        let rerun = p.run_qc(&id).unwrap();
        assert!(rerun.flags.is_empty());
        assert!(rerun.advisory.is_none());
        assert_eq!(rerun.assessment.status, Severity::Green);
        assert!(p.store().flags(&id, Some(false)).unwrap().is_empty());
    }

    #[test]
    fn object_shaped_qc_reply_never_clears() {
        let reply = r#"{"error": "Unable to complete review", "flags": []}"#;
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), reply]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let outcome = p.generate(&PlanRequest::new(id)).unwrap();

        assert_eq!(
            outcome.advisories,
            vec![Advisory::QcResponseUnparseable {
                response_len: reply.len()
            }]
        );
        assert_eq!(outcome.assessment.status, Severity::Yellow);
        assert!(!outcome.assessment.clearance);
        assert!(!p.store().workflow(&id).unwrap().unwrap().qc_clearance_done);
        assert_eq!(p.store().patient(&id).unwrap().unwrap().qc_status, Severity::Yellow);
    }

    #[test]
    fn finalize_refused_while_yellow_then_allowed_after_resolution() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), YELLOW_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        let outcome = p.generate(&PlanRequest::new(id)).unwrap();
        assert_eq!(outcome.flags[0].target_section, Some(SectionName::FollowUps));

        let refused = p.finalize(&id, &checklist());
        assert!(matches!(
            refused,
            Err(PipelineError::FinalizePrecondition {
                status: Severity::Yellow
            })
        ));
        assert!(p.store().finalization(&id).unwrap().is_none());
        assert!(!p.store().workflow(&id).unwrap().unwrap().final_approval_done);
        assert_eq!(
            p.store().patient(&id).unwrap().unwrap().wf_status,
            WorkflowStatus::Draft
        );

        let assessment = p.mark_resolved(&id, &outcome.flags[0].id).unwrap();
        assert_eq!(assessment.status, Severity::Green);
        p.finalize(&id, &checklist()).unwrap();

        let saved = p.store().finalization(&id).unwrap().unwrap();
        assert_eq!(saved.nurse_confidence, 4);
        let state = p.store().workflow(&id).unwrap().unwrap();
        assert_eq!(state.completed_steps(), 5);
        assert_eq!(
            p.store().patient(&id).unwrap().unwrap().wf_status,
            WorkflowStatus::Finalized
        );
    }

    #[test]
    fn regeneration_supersedes_plan_and_open_flags() {
        let plan = full_plan();
        let llm = Arc::new(ScriptedLlmClient::replies(&[&plan, RED_QC, &plan, CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);

        let first = p.generate(&PlanRequest::new(id)).unwrap();
        let second = p.generate(&PlanRequest::new(id)).unwrap();

        assert_eq!(second.plan.version, 2);
        assert_ne!(first.plan.id, second.plan.id);
        assert_eq!(p.store().plan_history(&id).unwrap().len(), 2);
        assert_eq!(p.store().current_plan(&id).unwrap().unwrap().id, second.plan.id);
        assert!(p.store().flags(&id, Some(false)).unwrap().is_empty());
        assert_eq!(p.qc_summary(&id).unwrap().resolved, 1);
        assert_eq!(second.assessment.status, Severity::Green);
    }

    #[test]
    fn section_edit_strips_headers_and_leaves_flags_alone() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), RED_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        let outcome = p.generate(&PlanRequest::new(id)).unwrap();

        p.edit_section(&id, SectionName::WarningSigns, "===WARNING SIGNS===\nCall 911 for slurred speech.")
            .unwrap();

        let sections = p.store().sections(&outcome.plan.id).unwrap();
        assert_eq!(
            sections.get(SectionName::WarningSigns),
            Some("Call 911 for slurred speech.")
        );
        let summary = p.qc_summary(&id).unwrap();
        assert_eq!(summary.status, Severity::Red);
        assert_eq!(summary.unresolved_red, 1);
    }

    #[test]
    fn operations_reject_missing_inputs() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan()]));
        let p = pipeline(&llm);

        let stranger = Uuid::new_v4();
        assert!(matches!(
            p.save_hospital_summary(&stranger, &record("Summary")),
            Err(PipelineError::PatientNotFound(_))
        ));

        let patient = Patient::new("Bo Chen", "MRN-43", Language::Zh, "SNF");
        p.store().insert_patient(&patient).unwrap();
        assert!(matches!(
            p.save_hospital_summary(&patient.id, &record("   ")),
            Err(PipelineError::EmptyHospitalSummary)
        ));
        assert!(matches!(
            p.generate(&PlanRequest::new(patient.id)),
            Err(PipelineError::NoClinicalContext(_))
        ));
        assert!(matches!(
            p.edit_section(&patient.id, SectionName::Diet, "Soft foods"),
            Err(PipelineError::NoCurrentPlan(_))
        ));
        assert!(matches!(
            p.mark_resolved(&patient.id, &Uuid::new_v4()),
            Err(PipelineError::FlagNotFound(_))
        ));
        assert_eq!(llm.call_count(), 0);

        p.save_hospital_summary(&patient.id, &record("Pontine lacunar infarct."))
            .unwrap();
        assert!(p.store().workflow(&patient.id).unwrap().unwrap().hospital_summary_done);
    }

    #[test]
    fn flag_from_another_patient_is_not_found() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), RED_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        let outcome = p.generate(&PlanRequest::new(id)).unwrap();

        let other = Patient::new("Cy Park", "MRN-44", Language::En, "Home");
        p.store().insert_patient(&other).unwrap();
        let result = p.apply_suggestion(&other.id, &outcome.flags[0].id, "text");
        assert!(matches!(result, Err(PipelineError::FlagNotFound(_))));
        assert_eq!(p.qc_summary(&id).unwrap().unresolved_red, 1);
    }

    struct PlainTextExporter;

    impl PlanExporter for PlainTextExporter {
        type Error = std::fmt::Error;

        fn render(&self, bundle: &ExportBundle) -> Result<Vec<u8>, Self::Error> {
            use std::fmt::Write;
            let mut out = String::new();
            writeln!(out, "Discharge plan v{}", bundle.plan.version)?;
            for (name, content) in bundle.sections.iter() {
                writeln!(out, "{}\n{}", name.as_str(), content)?;
            }
            if let Some(done) = &bundle.finalization {
                writeln!(out, "Confidence {}", done.nurse_confidence)?;
            }
            Ok(out.into_bytes())
        }
    }

    #[test]
    fn export_bundle_feeds_an_exporter() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        p.generate(&PlanRequest::new(id)).unwrap();
        p.finalize(&id, &checklist()).unwrap();

        let bundle = p.export_bundle(&id).unwrap();
        assert_eq!(bundle.patient.id, id);
        assert!(bundle.context.anticoagulant);
        let rendered = String::from_utf8(PlainTextExporter.render(&bundle).unwrap()).unwrap();
        assert!(rendered.starts_with("Discharge plan v1"));
        assert!(rendered.contains("Teach-Back"));
        assert!(rendered.contains("Confidence 4"));

        let audit = p.store().audit_events(&id, 50).unwrap();
        assert!(audit.iter().any(|e| e.message.contains("generated")));
        assert!(audit.iter().any(|e| e.message.contains("finalized")));
        assert!(audit.iter().any(|e| e.message.contains("exported")));
    }

    #[test]
    fn lock_is_released_after_each_operation() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        p.generate(&PlanRequest::new(id)).unwrap();

        assert!(p.locks().current_operation(&id).is_none());
        assert!(!p.locks().slot(&id).unwrap().is_busy());
    }

    #[test]
    fn plan_options_flow_into_the_stored_plan() {
        let llm = Arc::new(ScriptedLlmClient::replies(&[&full_plan(), CLEAN_QC]));
        let p = pipeline(&llm);
        let id = admit(&p);
        let options = PlanOptions {
            language: Language::Es,
            include_caregiver: false,
            ..PlanOptions::default()
        };

        let outcome = p
            .generate(&PlanRequest::new(id).with_options(options))
            .unwrap();

        assert_eq!(outcome.plan.options, options);
        assert!(llm.prompts()[0].contains("Spanish"));
    }
}
