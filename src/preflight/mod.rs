//! Preflight checks.
//!
//! Verifies every host tool the pipeline drives is installed before the
//! image is touched, so a missing binary never strands a half-shrunk image.

mod host_tools;
mod types;

pub use host_tools::check_host_tools;
pub use types::{CheckResult, CheckStatus, PreflightReport};

use crate::config::Config;
use crate::error::ShrinkError;

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    PreflightReport {
        checks: check_host_tools(config),
    }
}

/// Run preflight, printing the report and failing if any tool is missing.
pub fn run_preflight_or_fail(config: &Config) -> Result<(), ShrinkError> {
    let report = run_preflight(config);

    if !report.all_passed() {
        report.print();
        return Err(ShrinkError::MissingDependency(report.missing()));
    }

    tracing::debug!("all {} host tools found", report.checks.len());
    Ok(())
}
