//! Host tool availability checks.

use crate::config::Config;
use crate::tools::Tool;

use super::types::CheckResult;

/// Check every configured host tool resolves to an executable.
pub fn check_host_tools(config: &Config) -> Vec<CheckResult> {
    Tool::ALL
        .into_iter()
        .map(|tool| check_tool_exists(config.program(tool), tool.package()))
        .collect()
}

/// Check if a program exists in PATH (or at the given path).
fn check_tool_exists(program: &str, package: &str) -> CheckResult {
    match which::which(program) {
        Ok(path) => CheckResult::pass_with(program, &path.display().to_string()),
        Err(_) => CheckResult::fail(
            program,
            &format!("Not found. Install the '{}' package.", package),
        ),
    }
}
