//! Preflight checks for build validation.
//!
//! Validates that the host has the tools this program itself shells out to
//! before any archive is downloaded, so a missing tool fails in seconds
//! rather than after a multi-hundred-megabyte fetch. No compiler check: cross
//! builds supply theirs through `CROSS_COMPILE`, and the kernel build system
//! reports a missing one itself.

use anyhow::{bail, Result};

use crate::process;

/// Required host tools for building kernel modules.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("make", "make"), ("git", "git")];

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool and the package providing it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !process::exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check everything a `build` run needs.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_tools_pass() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn no_host_compiler_is_required() {
        // CROSS_COMPILE runs have no native gcc; only make and git are ours.
        assert!(REQUIRED_TOOLS.iter().all(|(tool, _)| !tool.contains("cc")));
    }

    #[test]
    fn missing_tool_is_reported_with_package() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_command_xyz"));
        assert!(err.contains("fake-package"));
    }
}
