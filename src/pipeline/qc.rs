use serde_json::Value;

use crate::models::enums::{SectionName, Severity};
use crate::models::{ClinicalContext, QcFinding, SectionMap};

use super::prompt::build_qc_prompt;
use super::retry::TextServiceClient;
use super::PipelineError;

/// Used when a finding carries no category label.
const UNSPECIFIED_FLAG_TYPE: &str = "Unspecified";

/// Outcome of a QC review that reached the service and got an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QcReview {
    /// The response held a flag array. May be empty: nothing was found.
    Findings(Vec<QcFinding>),
    /// The response could not be read as a flag array.
    Degraded { response_len: usize, reason: String },
}

impl QcReview {
    /// Findings as a plain list; a degraded review has none.
    pub fn findings(&self) -> &[QcFinding] {
        match self {
            QcReview::Findings(findings) => findings,
            QcReview::Degraded { .. } => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, QcReview::Degraded { .. })
    }
}

/// Run the second-pass review for a plan.
///
/// Transport failure is a `PipelineError::Service`; an unreadable reply is
/// `QcReview::Degraded`, never an error.
pub fn review_plan(
    service: &TextServiceClient,
    ctx: &ClinicalContext,
    sections: &SectionMap,
) -> Result<QcReview, PipelineError> {
    let prompt = build_qc_prompt(ctx, sections);
    let response = service.call(&prompt)?;
    Ok(parse_qc_response(&response))
}

/// Body of the first code fence, if any. A language tag directly after the
/// opening backticks (`json`, `JSON5`) is skipped only when whitespace
/// follows it; otherwise the body starts right after the backticks, so
/// single-line fences like ```[...]``` keep their payload.
fn fenced_body(response: &str) -> Option<&str> {
    let open = response.find("```")? + 3;
    let rest = &response[open..];
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(rest.len());
    let body_start = if tag_len > 0 && rest[tag_len..].starts_with(char::is_whitespace) {
        open + tag_len
    } else {
        open
    };
    let body_end = response[body_start..]
        .find("```")
        .map(|i| body_start + i)
        .unwrap_or(response.len());
    Some(&response[body_start..body_end])
}

/// Locate the JSON payload: the first fenced body, or the bare text.
///
/// Text that is already valid JSON, or that opens an object, is returned
/// as is, so a non-array reply degrades instead of yielding an array nested
/// inside it. Only prose that is not JSON is searched for a bare array.
fn extract_json_payload(response: &str) -> &str {
    let payload = fenced_body(response).unwrap_or(response).trim();

    if payload.starts_with(['[', '{']) || serde_json::from_str::<Value>(payload).is_ok() {
        return payload;
    }
    match (payload.find('['), payload.rfind(']')) {
        (Some(open), Some(close)) if open < close => &payload[open..=close],
        _ => payload,
    }
}

fn string_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Turn the raw QC reply into findings. Items without a message are
/// skipped; unknown severities become YELLOW; unknown target sections are
/// dropped to `None`.
pub fn parse_qc_response(response: &str) -> QcReview {
    let payload = extract_json_payload(response);
    let degraded = |reason: String| {
        tracing::warn!(
            response_len = response.len(),
            reason = %reason,
            "QC response unparseable, degrading to manual review"
        );
        QcReview::Degraded {
            response_len: response.len(),
            reason,
        }
    };

    let items = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return degraded("QC payload is not a JSON array".into()),
        Err(e) => return degraded(format!("invalid JSON: {e}")),
    };

    let mut findings = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    let mut unknown_targets = 0usize;
    let mut defaulted_severity = 0usize;

    for item in &items {
        let Some(message) = string_field(item, "message") else {
            skipped += 1;
            continue;
        };

        let severity = match string_field(item, "severity").and_then(Severity::from_lenient) {
            Some(s) => s,
            None => {
                defaulted_severity += 1;
                Severity::Yellow
            }
        };

        let target_section = match string_field(item, "target_section") {
            Some(raw) => {
                let parsed = SectionName::from_lenient(raw);
                if parsed.is_none() {
                    unknown_targets += 1;
                }
                parsed
            }
            None => None,
        };

        findings.push(QcFinding {
            flag_type: string_field(item, "flag_type")
                .unwrap_or(UNSPECIFIED_FLAG_TYPE)
                .to_string(),
            severity,
            message: message.to_string(),
            suggested_fix: string_field(item, "suggested_fix").unwrap_or("").to_string(),
            target_section,
        });
    }

    if skipped > 0 || unknown_targets > 0 || defaulted_severity > 0 {
        tracing::warn!(
            skipped,
            unknown_targets,
            defaulted_severity,
            kept = findings.len(),
            "QC response contained irregular items"
        );
    }

    if findings.is_empty() && !items.is_empty() {
        return degraded(format!("none of {} QC items were usable", items.len()));
    }

    tracing::debug!(findings = findings.len(), "QC response parsed");
    QcReview::Findings(findings)
}
