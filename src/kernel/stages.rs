//! Named kernel build system stages.
//!
//! The kernel's own build system does the real work; this module only
//! sequences it. Each stage is a named make target with an explicit
//! precondition on the tree it runs in, so ordering mistakes fail with a
//! clear message instead of deep inside a make recursion.
//!
//! `ARCH` and `CROSS_COMPILE` are passed through from the environment when
//! set, since module builds for foreign devices are routinely cross-compiled.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// One invocation of the kernel build system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbuildStage {
    /// Re-resolve the extracted `.config` against the tree's Kconfig.
    OldConfig,
    /// Generate headers and scripts needed before any compilation.
    Prepare,
    /// Generate everything external module builds depend on.
    ModulesPrepare,
    /// Build external modules rooted at the given directory (`M=`).
    Modules { module_dir: PathBuf },
}

impl KbuildStage {
    fn target(&self) -> &'static str {
        match self {
            KbuildStage::OldConfig => "oldconfig",
            KbuildStage::Prepare => "prepare",
            KbuildStage::ModulesPrepare => "modules_prepare",
            KbuildStage::Modules { .. } => "modules",
        }
    }

    /// Whether the stage needs a `.config` already present in the tree.
    fn needs_config(&self) -> bool {
        // Every stage after extraction runs against the shipped .config.
        true
    }
}

impl fmt::Display for KbuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// Kernel build system driver bound to one tree (the extracted headers).
pub struct Kbuild {
    tree: PathBuf,
}

impl Kbuild {
    pub fn new(tree: &Path) -> Self {
        Self {
            tree: tree.to_path_buf(),
        }
    }

    /// Run one stage. Inherits stdio so kernel build output is visible.
    pub fn run(&self, stage: &KbuildStage) -> Result<()> {
        self.check_preconditions(stage)?;

        println!("  make {}...", stage);
        let mut cmd = Cmd::new("make")
            .args(["-C"])
            .arg_path(&self.tree)
            .arg(format!("-j{}", parallelism()));

        for var in ["ARCH", "CROSS_COMPILE"] {
            if let Ok(value) = std::env::var(var) {
                cmd = cmd.arg(format!("{}={}", var, value));
            }
        }

        if let KbuildStage::Modules { module_dir } = stage {
            cmd = cmd.arg(format!("M={}", module_dir.display()));
        }

        cmd.arg(stage.target())
            .error_msg(format!("make {} failed in {}", stage, self.tree.display()))
            .run_interactive()
    }

    /// Flip one configuration entry to build as a loadable module, using the
    /// kernel's own config-editing helper. Entries are independent; order of
    /// application does not matter.
    pub fn enable_module(&self, name: &str) -> Result<()> {
        let helper = self.tree.join("scripts/config");
        if !helper.is_file() {
            bail!(
                "scripts/config not found in {} - archive is not a usable kernel tree",
                self.tree.display()
            );
        }

        println!("  Enabling {}=m", name);
        Cmd::new(helper.to_string_lossy())
            .current_dir(&self.tree)
            .args(["--module", name])
            .error_msg(format!("scripts/config --module {} failed", name))
            .run()
    }

    fn check_preconditions(&self, stage: &KbuildStage) -> Result<()> {
        if !self.tree.join("Makefile").exists() {
            bail!(
                "No Makefile in {} - archive is not a usable kernel tree",
                self.tree.display()
            );
        }
        if stage.needs_config() && !self.tree.join(".config").exists() {
            bail!(
                "No .config in {} - cannot run make {}",
                self.tree.display(),
                stage
            );
        }
        if let KbuildStage::Modules { module_dir } = stage {
            if !module_dir.join("Makefile").exists() {
                bail!(
                    "No Makefile in module directory {}",
                    module_dir.display()
                );
            }
        }
        Ok(())
    }
}

fn parallelism() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            eprintln!("  [WARN] Could not detect CPU count ({}), using 4 cores", e);
            4
        }
    }
}
