//! Dependency preflight.
//!
//! A run needs four external tools; probing them up front reports every
//! missing one at once instead of failing mid-run on the first.

use std::path::Path;

use snapsend_core::{BackupError, BackupResult, ErrorKind};
use snapsend_engine::command::TOOL_DIR;

const REQUIRED_TOOLS: [&str; 4] = ["btrfs", "mountpoint", "pv", "du"];

/// Verifies every required tool is installed.
///
/// # Errors
///
/// [`ErrorKind::DependencyMissing`] naming all absent tools.
pub fn check_dependencies() -> BackupResult<()> {
    let missing = missing_tools(Path::new(TOOL_DIR), &REQUIRED_TOOLS);
    if missing.is_empty() {
        return Ok(());
    }
    Err(BackupError::new(
        ErrorKind::DependencyMissing,
        format!("required tools are not installed: {}", missing.join(", ")),
    )
    .with_suggestion(format!(
        "install the packages providing {}",
        missing.join(", ")
    )))
}

fn missing_tools(dir: &Path, tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| !dir.join(tool).exists())
        .map(|tool| (*tool).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::missing_tools;

    #[test]
    fn present_tools_are_not_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("btrfs"), b"").expect("fake tool");
        std::fs::write(dir.path().join("pv"), b"").expect("fake tool");

        let missing = missing_tools(dir.path(), &["btrfs", "pv", "du"]);
        assert_eq!(missing, vec!["du".to_string()]);
    }

    #[test]
    fn an_empty_tool_dir_reports_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = missing_tools(dir.path(), &["btrfs", "mountpoint"]);
        assert_eq!(missing.len(), 2);
    }
}
