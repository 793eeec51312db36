use crate::models::enums::{SectionName, Severity};
use crate::models::{ClinicalContext, PlanOptions, QcFlag, SectionMap};

pub const SYSTEM_PROMPT: &str = "You are an expert medical discharge planner specializing in stroke care. \
Generate accurate, patient-friendly discharge instructions.";

/// Hospital summary excerpt length used in expansion prompts (characters).
const EXPANSION_SUMMARY_CHARS: usize = 500;

/// Shown in place of empty or placeholder section content.
const EMPTY_SECTION_NOTE: &str = "[Empty - needs to be generated from scratch]";

/// What each section must cover. Shared by generation and expansion prompts.
pub fn section_guidance(section: SectionName, ctx: &ClinicalContext) -> String {
    match section {
        SectionName::Medications => "List medications with dosages, timing, and special instructions. \
             Include anticoagulant warnings if applicable. Explain purpose of each medication simply."
            .to_string(),
        SectionName::WarningSigns => "List emergency symptoms that require calling 911 immediately. \
             Include stroke-specific warning signs. Make this clear and actionable."
            .to_string(),
        SectionName::Mobility => format!(
            "Include fall prevention strategies based on {} risk level. List assistive devices if needed. \
             Include PT/OT exercises. Address safety at home.",
            ctx.fall_risk
        ),
        SectionName::Diet => format!(
            "Include dysphagia precautions based on {} result. Nutrition recommendations. \
             Hydration guidelines. Food textures if needed.",
            ctx.dysphagia_result
        ),
        SectionName::FollowUps => "REQUIRED: Include a specific follow-up schedule:\n\
             - Neurology appointment within 1-2 weeks\n\
             - Primary care physician within 1 week\n\
             - Physical therapy/Occupational therapy if needed\n\
             - Lab work if on anticoagulant (INR check timeline)\n\
             - Any specialist referrals (cardiology, endocrinology, etc.)\n\
             - Imaging follow-up if needed (carotid ultrasound, echocardiogram)\n\
             Provide specific timeframes for each appointment."
            .to_string(),
        SectionName::TeachBack => "REQUIRED: Create 5-7 teach-back verification questions such as:\n\
             - \"Can you tell me what medications you'll take and when?\"\n\
             - \"What symptoms would make you call 911?\"\n\
             - \"How will you prevent falls at home?\"\n\
             - \"What foods/drinks should you avoid?\" (if dysphagia)\n\
             - \"When is your follow-up appointment?\"\n\
             Make questions specific to this patient's needs."
            .to_string(),
    }
}

fn clinical_block(ctx: &ClinicalContext) -> String {
    format!(
        "CLINICAL INFORMATION:\n\
         - Stroke Type: {}\n\
         - Fall Risk: {}\n\
         - Dysphagia Screen: {}\n\
         - On Anticoagulant: {}",
        ctx.stroke_type,
        ctx.fall_risk,
        ctx.dysphagia_result,
        ctx.anticoagulant_label()
    )
}

/// Full-plan generation prompt. Mandates the six `===NAME===` markers in
/// canonical order.
pub fn build_generation_prompt(ctx: &ClinicalContext, options: &PlanOptions) -> String {
    let target_language = options.language.display_name();

    let mut instructions = vec![
        format!("- Generate the discharge plan in {target_language}"),
        format!("- {}", options.reading_level.instruction()),
    ];
    if options.include_caregiver {
        instructions.push("- Include specific instructions for caregivers throughout all sections".into());
    }
    instructions.push(format!("- Base recommendations on stroke type ({})", ctx.stroke_type));
    instructions.push(format!("- Address fall risk level ({})", ctx.fall_risk));
    instructions.push(format!(
        "- Include dysphagia precautions (screen result: {})",
        ctx.dysphagia_result
    ));
    if ctx.anticoagulant {
        instructions.push("- Include anticoagulant warnings and bleeding precautions".into());
    }
    instructions.push("- Use professional medical language - DO NOT use emojis".into());
    instructions.push("- Use bullet points for lists, bold text for emphasis".into());

    let sections = SectionName::ALL
        .iter()
        .map(|name| format!("{}\n[{}]", name.marker(), section_guidance(*name, ctx)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a medical discharge planner creating a comprehensive stroke discharge plan.

PATIENT INFORMATION:
- Name: {name}
- MRN: {mrn}
- Language Preference: {target_language}
- Disposition: {disposition}

{clinical}

HOSPITAL SUMMARY:
{summary}

INSTRUCTIONS:
{instructions}

Generate EXACTLY 6 sections with the following structure. Use these EXACT section headers, in this order:

{sections}

CRITICAL: Use the exact section headers shown above (===SECTION NAME===). This is essential for parsing."#,
        name = ctx.patient_name,
        mrn = ctx.mrn,
        disposition = ctx.disposition,
        clinical = clinical_block(ctx),
        summary = ctx.hospital_summary,
        instructions = instructions.join("\n"),
    )
}

/// Second-pass review prompt. The reply contract is a JSON array of flag
/// objects.
pub fn build_qc_prompt(ctx: &ClinicalContext, sections: &SectionMap) -> String {
    let plan_text = sections
        .iter()
        .map(|(name, content)| format!("{}\n{}", name.marker(), content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let canonical = SectionName::ALL
        .iter()
        .map(|n| format!("\"{}\"", n.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a medical quality control reviewer for stroke discharge plans.

PATIENT INFORMATION:
- Name: {name}
- MRN: {mrn}
- Disposition: {disposition}

{clinical}

HOSPITAL SUMMARY:
{summary}

DISCHARGE PLAN TO REVIEW:
{plan_text}

INSTRUCTIONS:
Review the discharge plan for quality issues. Check for:

1. COMPLETENESS:
   - All sections have appropriate content
   - Medication lists are present
   - Follow-up appointments specified with timelines
   - Emergency warning signs included

2. SAFETY:
   - Anticoagulant bleeding precautions present if patient on anticoagulants
   - Fall prevention strategies appropriate for {fall_risk} fall risk
   - Dysphagia precautions match screen result ({dysphagia})
   - Emergency warning signs clearly listed

3. CONSISTENCY:
   - Recommendations match stroke type ({stroke_type})
   - Diet instructions match dysphagia status ({dysphagia})
   - No contradictions between sections

4. MEDICAL ACCURACY:
   - Medication dosages are appropriate
   - No contraindicated medications
   - Follows stroke discharge guidelines (AHA/NINDS)

For each issue found, return a JSON object with:
- flag_type: Category of issue (e.g., "Safety - Anticoagulant", "Completeness - Medications")
- severity: "RED", "YELLOW" or "GREEN"
- message: Clear description of the issue
- suggested_fix: Specific text to add or modify to fix the issue
- target_section: Which section to update. Must be one of: {canonical}

SEVERITY GUIDELINES:
- RED: Missing anticoagulant bleeding warnings, missing emergency signs, medically incorrect information, missing critical medications
- YELLOW: Missing follow-up timelines, incomplete sections, minor inconsistencies, missing recommended but non-critical information
- GREEN: Minor improvements, style suggestions

Return ONLY a JSON array of flags. If no issues are found, return an empty array [].

Example format:
[
  {{
    "flag_type": "Safety - Anticoagulant",
    "severity": "RED",
    "message": "Bleeding precautions missing. Patient is on anticoagulant.",
    "suggested_fix": "BLEEDING PRECAUTIONS: Call your doctor if you notice unusual bleeding, bruising, blood in urine or stool, or severe headaches.",
    "target_section": "Warning Signs"
  }}
]"#,
        name = ctx.patient_name,
        mrn = ctx.mrn,
        disposition = ctx.disposition,
        clinical = clinical_block(ctx),
        summary = ctx.hospital_summary,
        fall_risk = ctx.fall_risk,
        dysphagia = ctx.dysphagia_result,
        stroke_type = ctx.stroke_type,
    )
}

fn severity_emphasis(severity: Severity) -> &'static str {
    match severity {
        Severity::Red => "CRITICAL: This is a safety issue. Address it with clear, direct, actionable language.",
        Severity::Yellow => "IMPORTANT: This needs attention. Provide clear, helpful guidance.",
        Severity::Green => "Enhancement: Improve clarity and completeness.",
    }
}

/// Truncate at a char boundary, marking the cut with an ellipsis.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Regenerate one section so the accepted fix is provably present.
///
/// `fix_text` is the remediation the clinician accepted, usually the flag's
/// `suggested_fix`, possibly edited.
pub fn build_expansion_prompt(
    ctx: &ClinicalContext,
    options: &PlanOptions,
    section: SectionName,
    current_content: Option<&str>,
    flag: &QcFlag,
    fix_text: &str,
) -> String {
    let current = match current_content.map(str::trim) {
        Some(c) if !c.is_empty() && !c.starts_with('[') => c,
        _ => EMPTY_SECTION_NOTE,
    };

    format!(
        r#"You are regenerating one section of a stroke discharge plan to address a quality control concern.

IMPORTANT: Write ALL content in {language}. {reading}

PATIENT INFORMATION:
- Name: {name}, MRN: {mrn}
- Disposition: {disposition}

{clinical}

HOSPITAL SUMMARY:
{summary}

SECTION TO REGENERATE: {section}

CURRENT SECTION CONTENT:
{current}

QUALITY CONTROL ISSUE ({severity} priority):
{message}

REQUIRED CHANGES:
{fix_text}

{emphasis}

TASK:
Regenerate the ENTIRE "{section}" section by:
1. MUST INCLUDE the required changes: the content from "REQUIRED CHANGES" above must appear in your output
2. Preserving good content: keep existing accurate information that does not conflict with the required changes
3. Integrating changes naturally: weave the required changes into the section, not as a separate appendix

SECTION REQUIREMENTS:
{guidance}

CRITICAL RULES:
- Output ONLY the section content (no headers, no titles, no meta-commentary)
- Do NOT include section headers like "{marker}"
- Do NOT include titles like "{section} for {name}"
- Start directly with the content (bullet points or paragraphs)
- If the current section is empty, generate the complete section from scratch including the required changes
- Do NOT duplicate information from other sections
- DO NOT use emojis

OUTPUT (content only, no titles or headers):"#,
        language = options.language.display_name(),
        reading = options.reading_level.instruction(),
        name = ctx.patient_name,
        mrn = ctx.mrn,
        disposition = ctx.disposition,
        clinical = clinical_block(ctx),
        summary = excerpt(&ctx.hospital_summary, EXPANSION_SUMMARY_CHARS),
        section = section.as_str(),
        severity = flag.severity.as_str(),
        message = flag.message,
        emphasis = severity_emphasis(flag.severity),
        guidance = section_guidance(section, ctx),
        marker = section.marker(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{Language, ReadingLevel};
    use uuid::Uuid;

    fn context(anticoagulant: bool) -> ClinicalContext {
        ClinicalContext {
            patient_name: "Ann Lee".into(),
            mrn: "MRN-42".into(),
            language: Language::En,
            disposition: "Home".into(),
            stroke_type: "Ischemic".into(),
            fall_risk: "High".into(),
            dysphagia_result: "Fail".into(),
            anticoagulant,
            hospital_summary: "Presented with right arm weakness.".into(),
        }
    }

    fn flag(severity: Severity) -> QcFlag {
        QcFlag {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            flag_type: "Safety - Anticoagulant".into(),
            severity,
            message: "Bleeding precautions missing.".into(),
            suggested_fix: "Add bleeding precautions.".into(),
            target_section: Some(SectionName::WarningSigns),
            resolved: false,
            created_at: chrono::Local::now().naive_local(),
            resolved_at: None,
        }
    }

    #[test]
    fn generation_prompt_lists_markers_in_order() {
        let prompt = build_generation_prompt(&context(false), &PlanOptions::default());
        let positions: Vec<usize> = SectionName::ALL
            .iter()
            .map(|n| prompt.find(&n.marker()).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("EXACTLY 6 sections"));
        assert!(prompt.contains("5-7 teach-back verification questions"));
        assert!(prompt.contains("Provide specific timeframes"));
    }

    #[test]
    fn generation_prompt_respects_options() {
        let options = PlanOptions {
            language: Language::Es,
            reading_level: ReadingLevel::Standard,
            include_caregiver: false,
        };
        let prompt = build_generation_prompt(&context(false), &options);
        assert!(prompt.contains("Generate the discharge plan in Spanish (Español)"));
        assert!(prompt.contains("8th-10th grade"));
        assert!(!prompt.contains("caregivers throughout"));
        assert!(!prompt.contains("bleeding precautions"));
    }

    #[test]
    fn anticoagulant_adds_bleeding_directive() {
        let prompt = build_generation_prompt(&context(true), &PlanOptions::default());
        assert!(prompt.contains("Include anticoagulant warnings and bleeding precautions"));
        assert!(prompt.contains("On Anticoagulant: Yes"));
        assert!(prompt.contains("caregivers throughout"));
    }

    #[test]
    fn qc_prompt_embeds_sections_and_contract() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::Medications, "Take aspirin.".into());
        let prompt = build_qc_prompt(&context(true), &sections);
        assert!(prompt.contains("===MEDICATIONS===\nTake aspirin."));
        assert!(prompt.contains("Return ONLY a JSON array"));
        assert!(prompt.contains("\"Warning Signs\""));
        for rubric in ["COMPLETENESS", "SAFETY", "CONSISTENCY", "MEDICAL ACCURACY"] {
            assert!(prompt.contains(rubric));
        }
    }

    #[test]
    fn expansion_prompt_treats_placeholder_as_empty() {
        let prompt = build_expansion_prompt(
            &context(true),
            &PlanOptions::default(),
            SectionName::WarningSigns,
            Some("[Warning Signs content not generated]"),
            &flag(Severity::Red),
            "Call 911 for sudden weakness.",
        );
        assert!(prompt.contains(EMPTY_SECTION_NOTE));
        assert!(prompt.contains("REQUIRED CHANGES:\nCall 911 for sudden weakness."));
        assert!(prompt.contains("CRITICAL: This is a safety issue"));
        assert!(prompt.contains("Do NOT include section headers like \"===WARNING SIGNS===\""));
    }

    #[test]
    fn expansion_prompt_keeps_existing_content() {
        let prompt = build_expansion_prompt(
            &context(false),
            &PlanOptions::default(),
            SectionName::Diet,
            Some("Soft foods only."),
            &flag(Severity::Green),
            "Add hydration guidance.",
        );
        assert!(prompt.contains("CURRENT SECTION CONTENT:\nSoft foods only."));
        assert!(prompt.contains("Enhancement"));
        assert!(prompt.contains("dysphagia precautions based on Fail"));
    }

    #[test]
    fn expansion_summary_is_truncated() {
        let mut ctx = context(false);
        ctx.hospital_summary = "é".repeat(800);
        let prompt = build_expansion_prompt(
            &ctx,
            &PlanOptions::default(),
            SectionName::Diet,
            None,
            &flag(Severity::Yellow),
            "fix",
        );
        assert!(prompt.contains(&format!("{}...", "é".repeat(500))));
        assert!(!prompt.contains(&"é".repeat(501)));
    }
}
