//! Stroke discharge plan generation and quality control.
//!
//! [`pipeline::DischargePipeline`] is the entry point: it builds prompts from
//! a patient's clinical context, calls the generative text service, splits
//! the reply into six plan sections, runs a second QC pass, and gates
//! finalization on the aggregated QC status.

pub mod config;
pub mod db;
pub mod models;
pub mod patient_lock;
pub mod pipeline;

mod phi_audit;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::debug!(version = config::APP_VERSION, "Tracing initialized");
}
