//! Repository layer: entity-scoped database operations as free functions
//! over `&Connection`. Multi-row writes that must land together open their
//! own transaction.

mod audit;
mod clinical;
mod finalization;
mod patient;
mod plan;
mod qc_flag;
mod workflow;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::DatabaseError;

pub use audit::*;
pub use clinical::*;
pub use finalization::*;
pub use patient::*;
pub use plan::*;
pub use qc_flag::*;
pub use workflow::*;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(&chrono::Local::now().naive_local())
}

pub(crate) fn parse_timestamp(value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp '{value}': {e}")))
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
