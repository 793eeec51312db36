//! Plan generation and quality-control pipeline.
//!
//! prompt → text service (with retry) → section parser → store → QC review →
//! severity aggregation → workflow gates. Flag acceptance re-enters through
//! the suggestion applier.

pub mod apply;
pub mod client;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod qc;
pub mod retry;
pub mod sanitize;
pub mod severity;
pub mod workflow;

pub use apply::*;
pub use client::*;
pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;
pub use qc::*;
pub use retry::*;
pub use sanitize::*;
pub use severity::*;
pub use workflow::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{SectionName, Severity};

/// Failure of a single round trip to the generative text service.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Text service is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Text service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed text service response: {0}")]
    MalformedResponse(String),

    #[error("No API key configured for the text service")]
    MissingApiKey,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl LlmError {
    /// Transport failures, rate limiting and server errors are worth another
    /// attempt. Client errors and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Connection(_) | LlmError::Timeout(_) | LlmError::HttpClient(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::MalformedResponse(_) | LlmError::MissingApiKey => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Text service failed after {attempts} attempt(s): {source}")]
    Service {
        attempts: usize,
        #[source]
        source: LlmError,
    },

    #[error("Generated plan could not be parsed: {0}")]
    Parse(String),

    #[error("Finalization requires GREEN QC status (current: {status})")]
    FinalizePrecondition { status: Severity },

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("No clinical context recorded for patient {0}")]
    NoClinicalContext(Uuid),

    #[error("Patient {0} has no current plan")]
    NoCurrentPlan(Uuid),

    #[error("QC flag not found: {0}")]
    FlagNotFound(Uuid),

    #[error("QC flag {0} is already resolved")]
    FlagAlreadyResolved(Uuid),

    #[error("Invalid finalization: {0}")]
    InvalidFinalization(String),

    #[error("Hospital summary is empty")]
    EmptyHospitalSummary,

    #[error("Patient lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A recoverable ambiguity reported alongside a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// QC returned text that held no parseable flag array. A YELLOW review
    /// flag was recorded in place of the missing findings.
    QcResponseUnparseable { response_len: usize },
    /// The automatic QC run after generation did not complete. The plan is
    /// saved; a YELLOW review flag was recorded.
    QcReviewFailed { attempts: usize },
    /// The accepted flag named no section present in the plan. The flag was
    /// resolved and nothing was written.
    TargetSectionMissing {
        flag_id: Uuid,
        target: Option<SectionName>,
    },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::QcResponseUnparseable { .. } => write!(
                f,
                "QC response could not be read; the plan needs manual review before clearance"
            ),
            Advisory::QcReviewFailed { attempts } => write!(
                f,
                "Plan saved, but QC review failed after {attempts} attempt(s); re-run QC"
            ),
            Advisory::TargetSectionMissing { target: Some(t), .. } => write!(
                f,
                "Section '{t}' was not found in the plan; flag resolved without writing content"
            ),
            Advisory::TargetSectionMissing { target: None, .. } => write!(
                f,
                "Flag names no target section; flag resolved without writing content"
            ),
        }
    }
}
