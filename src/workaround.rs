//! Device-specific pre-build workarounds.
//!
//! Some device types ship headers that need a local touch-up before the
//! kernel build system accepts them (stale symlinks, host-built fixdep
//! binaries, and similar). Those adjustments live outside this tool as
//! per-device hook scripts; we only invoke them.
//!
//! Hook failures are logged and otherwise ignored: a hook is a best-effort
//! adjustment, and the build itself will surface any problem it was meant to
//! paper over.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment override for the hook script directory.
pub const WORKAROUNDS_DIR_ENV: &str = "KMOD_WORKAROUNDS_DIR";

const DEFAULT_WORKAROUNDS_DIR: &str = "workarounds";

/// Hook script directory: `KMOD_WORKAROUNDS_DIR`, or `workarounds` relative
/// to the working directory.
pub fn hooks_dir() -> PathBuf {
    std::env::var(WORKAROUNDS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORKAROUNDS_DIR))
}

/// Run the hook for `device` out of `dir`, if one exists, with
/// `(device, version, extracted_dir)` as arguments.
pub fn apply_from(dir: &Path, device: &str, version: &str, extracted_dir: &Path) {
    let script = dir.join(format!("{}.sh", device));
    if !script.is_file() {
        return;
    }

    println!("  Applying workaround hook {}", script.display());
    let status = Command::new("sh")
        .arg(&script)
        .arg(device)
        .arg(version)
        .arg(extracted_dir)
        .status();

    match status {
        Ok(s) if s.success() => {}
        Ok(s) => eprintln!(
            "  [WARN] workaround hook {} exited with {}; continuing",
            script.display(),
            s.code().unwrap_or(-1)
        ),
        Err(e) => eprintln!(
            "  [WARN] workaround hook {} could not run: {}; continuing",
            script.display(),
            e
        ),
    }
}
