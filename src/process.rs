//! Subprocess helpers.
//!
//! `Cmd` is a thin builder over `std::process::Command` that attaches a
//! caller-supplied error message to failures, so call sites read as a single
//! chain and every failure names the tool that broke.

use anyhow::{bail, Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Command builder with uniform failure reporting.
pub struct Cmd {
    program: String,
    inner: Command,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let inner = Command::new(&program);
        Self {
            program,
            inner,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.inner.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.inner.args(args);
        self
    }

    /// Append a path argument without lossy conversion.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.inner.arg(path);
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.inner.current_dir(dir);
        self
    }

    /// Message to report when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Run with captured output; on failure the stderr tail is included.
    pub fn run(mut self) -> Result<()> {
        let output = self
            .inner
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let msg = self
            .error_msg
            .unwrap_or_else(|| format!("{} failed", self.program));
        bail!(
            "{}\n  Exit code: {}\n  stderr: {}",
            msg,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    /// Run with inherited stdio so the user sees progress (kernel builds,
    /// clones). Fails on non-zero exit.
    pub fn run_interactive(mut self) -> Result<()> {
        let status = self
            .inner
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if status.success() {
            return Ok(());
        }

        let msg = self
            .error_msg
            .unwrap_or_else(|| format!("{} failed", self.program));
        bail!("{}\n  Exit code: {}", msg, status.code().unwrap_or(-1));
    }
}

/// Check if a command exists on the host system.
pub fn exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Fail with a descriptive message when a required path is missing.
pub fn ensure_exists(path: &Path, what: &str) -> Result<PathBuf> {
    if !path.exists() {
        bail!("{} not found at: {}", what, path.display());
    }
    Ok(path.to_path_buf())
}
