//! Kernel source provisioning.
//!
//! Builds need a kernel source tree matching the exact version the extracted
//! headers were generated from. Trees are cached under
//! `~/.cache/kmod-build/linux_<version>` and cloned shallow, pinned to the
//! `v<version>` tag, on first need. A tree that already exists is trusted
//! as-is; there is no integrity check against its contents.

pub mod stages;

pub use stages::{Kbuild, KbuildStage};

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Default upstream: the mainline stable kernel repository.
pub const DEFAULT_KERNEL_GIT: &str =
    "https://git.kernel.org/pub/scm/linux/kernel/git/stable/linux.git";

/// Environment override for the kernel git URL.
pub const KERNEL_GIT_ENV: &str = "KMOD_KERNEL_GIT";

/// Parse the kernel version out of an extracted tree's `.config`.
///
/// The file opens with a header like:
///
/// ```text
/// # Linux/arm64 5.10.95 Kernel Configuration
/// ```
///
/// The version is the third whitespace-separated token of the line carrying
/// the `Kernel Configuration` marker.
pub fn kernel_version_from_config(tree: &Path) -> Result<String> {
    let config_path = tree.join(".config");
    let config = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    for line in config.lines() {
        if !line.contains("Kernel Configuration") {
            continue;
        }
        if let Some(version) = line.split_whitespace().nth(2) {
            return Ok(version.to_string());
        }
    }

    bail!(
        "No 'Kernel Configuration' header in {}",
        config_path.display()
    )
}

/// Where kernel source trees are cached, keyed by kernel version.
pub fn source_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kmod-build")
}

/// Kernel git URL to clone from: `KMOD_KERNEL_GIT`, or the stable upstream.
pub fn git_url() -> String {
    std::env::var(KERNEL_GIT_ENV).unwrap_or_else(|_| DEFAULT_KERNEL_GIT.to_string())
}

/// Presence-check-then-clone against an explicit cache root.
pub fn ensure_kernel_source_in(
    cache_root: &Path,
    kernel_version: &str,
    git_url: &str,
) -> Result<PathBuf> {
    let tree = cache_root.join(format!("linux_{}", kernel_version));
    if tree.exists() {
        println!("  Kernel source {} already present", tree.display());
        return Ok(tree);
    }

    fs::create_dir_all(cache_root)
        .with_context(|| format!("Failed to create {}", cache_root.display()))?;

    let tag = format!("v{}", kernel_version);
    println!("  Cloning kernel {} from {}...", tag, git_url);
    Cmd::new("git")
        .args(["clone", "--depth", "1", "--branch"])
        .arg(&tag)
        .arg(git_url)
        .arg_path(&tree)
        .error_msg(format!(
            "git clone of kernel {} failed. Check that tag {} exists upstream.",
            kernel_version, tag
        ))
        .run_interactive()?;

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_from_config_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".config"),
            "#\n# Linux/arm64 5.10.95 Kernel Configuration\n#\nCONFIG_ARM64=y\n",
        )
        .unwrap();

        assert_eq!(kernel_version_from_config(dir.path()).unwrap(), "5.10.95");
    }

    #[test]
    fn rejects_config_without_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".config"), "CONFIG_ARM64=y\n").unwrap();

        assert!(kernel_version_from_config(dir.path()).is_err());
    }

    #[test]
    fn rejects_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(kernel_version_from_config(dir.path()).is_err());
    }

    #[test]
    fn git_url_falls_back_to_stable_upstream() {
        if std::env::var(KERNEL_GIT_ENV).is_ok() {
            return;
        }
        assert_eq!(git_url(), DEFAULT_KERNEL_GIT);
    }

    #[test]
    fn ensure_kernel_source_short_circuits_on_existing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("linux_5.10.95");
        fs::create_dir_all(&tree).unwrap();

        // git URL is unreachable; the presence check must win before any clone.
        let got =
            ensure_kernel_source_in(dir.path(), "5.10.95", "http://git.invalid/linux.git")
                .unwrap();
        assert_eq!(got, tree);
    }

    #[test]
    fn tree_path_is_keyed_by_version() {
        let dir = tempfile::tempdir().unwrap();
        for v in ["5.10.95", "6.1.0"] {
            fs::create_dir_all(dir.path().join(format!("linux_{}", v))).unwrap();
        }
        let a = ensure_kernel_source_in(dir.path(), "5.10.95", "unused").unwrap();
        let b = ensure_kernel_source_in(dir.path(), "6.1.0", "unused").unwrap();
        assert_ne!(a, b);
    }
}
