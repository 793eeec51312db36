use uuid::Uuid;

use crate::db::DischargeStore;
use crate::models::enums::SectionName;
use crate::models::{ClinicalContext, PlanOptions, QcFlag, SectionMap};

use super::prompt::build_expansion_prompt;
use super::retry::TextServiceClient;
use super::sanitize::{clean_expansion, strip_section_headers};
use super::severity::QcAssessment;
use super::workflow::WorkflowGate;
use super::{Advisory, PipelineError};

/// Regenerated section text offered for review. Never stored by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionProposal {
    pub flag_id: Uuid,
    pub target: Option<SectionName>,
    pub content: String,
    /// `false` when no service call was made and `content` is the fix text as given.
    pub expanded: bool,
    pub advisory: Option<Advisory>,
}

/// Result of committing content for a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub flag_id: Uuid,
    pub section: Option<SectionName>,
    pub written: bool,
    pub assessment: QcAssessment,
    pub advisory: Option<Advisory>,
}

/// Look up an open flag that belongs to the patient.
pub fn load_open_flag(
    store: &dyn DischargeStore,
    patient_id: &Uuid,
    flag_id: &Uuid,
) -> Result<QcFlag, PipelineError> {
    let flag = store
        .flag(flag_id)?
        .filter(|f| f.patient_id == *patient_id)
        .ok_or(PipelineError::FlagNotFound(*flag_id))?;
    if flag.resolved {
        return Err(PipelineError::FlagAlreadyResolved(*flag_id));
    }
    Ok(flag)
}

/// Ask the service to regenerate the flag's target section with `fix_text`
/// worked in. A flag whose target is absent from the plan gets the fix text
/// back unchanged, with an advisory.
pub fn propose_expansion(
    service: &TextServiceClient,
    ctx: &ClinicalContext,
    options: &PlanOptions,
    sections: &SectionMap,
    flag: &QcFlag,
    fix_text: &str,
) -> Result<ExpansionProposal, PipelineError> {
    let target = match flag.target_section {
        Some(section) if sections.contains(section) => section,
        other => {
            return Ok(ExpansionProposal {
                flag_id: flag.id,
                target: other,
                content: strip_section_headers(fix_text),
                expanded: false,
                advisory: Some(Advisory::TargetSectionMissing {
                    flag_id: flag.id,
                    target: other,
                }),
            });
        }
    };

    let prompt = build_expansion_prompt(
        ctx,
        options,
        target,
        sections.get(target),
        flag,
        fix_text,
    );
    let raw = service.call(&prompt)?;
    let content = clean_expansion(&raw, &ctx.patient_name);

    tracing::info!(
        flag_id = %flag.id,
        section = target.as_str(),
        raw_len = raw.len(),
        cleaned_len = content.len(),
        "Expansion proposal generated"
    );

    Ok(ExpansionProposal {
        flag_id: flag.id,
        target: Some(target),
        content,
        expanded: true,
        advisory: None,
    })
}

/// Commit `content` for an open flag: overwrite the target section (after
/// header stripping), resolve the flag, and recompute status and clearance.
///
/// A target missing from the plan skips the write but still resolves the flag.
pub fn apply_suggestion(
    store: &dyn DischargeStore,
    flag: &QcFlag,
    content: &str,
) -> Result<ApplyOutcome, PipelineError> {
    let sanitized = strip_section_headers(content);

    let written = match flag.target_section {
        Some(section) => store.write_section(&flag.plan_id, section, &sanitized)?,
        None => false,
    };

    let advisory = if written {
        None
    } else {
        tracing::warn!(
            flag_id = %flag.id,
            target = flag.target_section.map(|s| s.as_str()).unwrap_or("none"),
            "Target section missing, resolving flag without writing content"
        );
        Some(Advisory::TargetSectionMissing {
            flag_id: flag.id,
            target: flag.target_section,
        })
    };

    let assessment = resolve_and_recompute(store, flag)?;

    Ok(ApplyOutcome {
        flag_id: flag.id,
        section: flag.target_section,
        written,
        assessment,
        advisory,
    })
}

/// Resolve one flag and re-derive status and clearance.
pub fn resolve_and_recompute(
    store: &dyn DischargeStore,
    flag: &QcFlag,
) -> Result<QcAssessment, PipelineError> {
    if !store.resolve_flag(&flag.id)? {
        return Err(PipelineError::FlagAlreadyResolved(flag.id));
    }
    WorkflowGate::new(store).recompute(&flag.patient_id, false)
}
