use uuid::Uuid;

use crate::models::enums::Severity;
use crate::models::{QcFlag, QcSummary};

/// Aggregate status and clearance gate derived from a flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QcAssessment {
    pub status: Severity,
    pub clearance: bool,
}

/// Flags that count toward the aggregate: unresolved and tied to the current plan.
fn open_flags_for_plan<'a>(
    flags: &'a [QcFlag],
    current_plan: Option<&'a Uuid>,
) -> impl Iterator<Item = &'a QcFlag> + 'a {
    flags
        .iter()
        .filter(move |f| !f.resolved && Some(&f.plan_id) == current_plan)
}

/// RED if any open flag is RED, else YELLOW if any is YELLOW, else GREEN.
pub fn aggregate_status(flags: &[QcFlag], current_plan: Option<&Uuid>) -> Severity {
    open_flags_for_plan(flags, current_plan)
        .map(|f| f.severity)
        .max()
        .unwrap_or(Severity::Green)
}

/// Status plus clearance: a current plan exists and no open flag is RED or YELLOW.
pub fn assess(flags: &[QcFlag], current_plan: Option<&Uuid>) -> QcAssessment {
    let status = aggregate_status(flags, current_plan);
    QcAssessment {
        status,
        clearance: current_plan.is_some() && !status.blocks_clearance(),
    }
}

/// Counts for the review screen. Resolved flags are counted across all plans.
pub fn summarize(flags: &[QcFlag], current_plan: Option<&Uuid>) -> QcSummary {
    let mut summary = QcSummary {
        status: aggregate_status(flags, current_plan),
        unresolved_red: 0,
        unresolved_yellow: 0,
        unresolved_green: 0,
        resolved: flags.iter().filter(|f| f.resolved).count(),
    };
    for flag in open_flags_for_plan(flags, current_plan) {
        match flag.severity {
            Severity::Red => summary.unresolved_red += 1,
            Severity::Yellow => summary.unresolved_yellow += 1,
            Severity::Green => summary.unresolved_green += 1,
        }
    }
    summary
}
