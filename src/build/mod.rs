//! Module build orchestration.
//!
//! Drives the whole per-version workflow: resolve published source archives,
//! fetch and extract each one, apply device workarounds, provision the
//! matching kernel source, run the kernel build system's preparation
//! targets, and build the requested modules out-of-tree into the destination
//! directory.
//!
//! Failure policy (deliberately asymmetric):
//! - a single archive's fetch or extraction failure is recorded against its
//!   version and the run continues with the next archive;
//! - kernel source clone failures and kernel build system failures abort the
//!   whole run.
//!
//! Processing is strictly sequential. The kernel source cache is shared
//! between iterations; any future parallel version would need per-version
//! isolation or a lock around it.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog::{Catalog, CatalogEntry};
use crate::extract::{self, ArchiveKind};
use crate::kernel::{self, Kbuild, KbuildStage};
use crate::{process, workaround};

/// Everything one `build` invocation was asked to do. Read-only for the
/// duration of the run.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Device slug the archives are published under.
    pub device: String,
    /// OS versions to build for, deduplicated, in request order.
    pub versions: Vec<String>,
    /// Module source subpath inside the kernel tree
    /// (e.g. `drivers/net/wireguard`).
    pub module_src: PathBuf,
    /// Configuration entries to set to `=m` before building.
    pub modules: Vec<String>,
    /// Destination root for build outputs.
    pub dest_dir: PathBuf,
}

/// A version whose archive could not be fetched or extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedVersion {
    pub version: String,
    pub reason: String,
}

/// Outcome of one run, threaded explicitly instead of accumulating in
/// process-wide state.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedVersion>,
}

impl RunReport {
    pub fn is_failure(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn failed_versions(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.version.as_str()).collect()
    }
}

enum ArchiveOutcome {
    Built,
    Skipped(String),
}

/// Destination directory name for one build. Full-source archives gain a
/// `_from_src` suffix so the two artifact kinds never collide.
pub fn output_dir_name(device: &str, version: &str, kind: ArchiveKind) -> String {
    format!("modules_{}_{}{}", device, version, kind.output_suffix())
}

/// Orchestrator bound to a catalog plus the ambient paths the workflow needs.
/// Production use goes through [`Orchestrator::new`]; tests inject their own
/// cache root, git URL and hook directory.
pub struct Orchestrator<'a> {
    catalog: &'a Catalog,
    source_cache: PathBuf,
    kernel_git: String,
    workarounds_dir: PathBuf,
}

impl<'a> Orchestrator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            source_cache: kernel::source_cache_dir(),
            kernel_git: kernel::git_url(),
            workarounds_dir: workaround::hooks_dir(),
        }
    }

    pub fn with_paths(
        catalog: &'a Catalog,
        source_cache: &Path,
        kernel_git: &str,
        workarounds_dir: &Path,
    ) -> Self {
        Self {
            catalog,
            source_cache: source_cache.to_path_buf(),
            kernel_git: kernel_git.to_string(),
            workarounds_dir: workarounds_dir.to_path_buf(),
        }
    }

    /// Process every requested version, one at a time.
    pub fn run(&self, req: &BuildRequest) -> Result<RunReport> {
        let mut report = RunReport::default();

        for version in &req.versions {
            println!("Processing {} {}...", req.device, version);

            let archives = match self.catalog.resolve_archives(&req.device, version) {
                Ok(archives) => archives,
                Err(e) => {
                    eprintln!("  [WARN] listing failed for {}: {:#}", version, e);
                    report.failed.push(FailedVersion {
                        version: version.clone(),
                        reason: format!("fetch failed: {:#}", e),
                    });
                    continue;
                }
            };

            if archives.is_empty() {
                eprintln!(
                    "  [WARN] no source archive published for {} {}; nothing to build",
                    req.device, version
                );
                continue;
            }

            let mut built_any = false;
            for entry in &archives {
                match self.build_archive(req, entry)? {
                    ArchiveOutcome::Built => built_any = true,
                    ArchiveOutcome::Skipped(reason) => {
                        eprintln!("  [WARN] skipping {}: {}", entry.key, reason);
                        report.failed.push(FailedVersion {
                            version: version.clone(),
                            reason,
                        });
                    }
                }
            }

            if built_any {
                report.succeeded.push(version.clone());
            }
        }

        Ok(report)
    }

    /// Build the requested modules from one archive. `Skipped` outcomes are
    /// per-archive failures the run survives; `Err` aborts the run. The
    /// scratch directory is dropped on every path out of here.
    fn build_archive(&self, req: &BuildRequest, entry: &CatalogEntry) -> Result<ArchiveOutcome> {
        let filename = entry.key.rsplit('/').next().unwrap_or(&entry.key);
        let kind = ArchiveKind::from_filename(filename);

        let scratch = tempfile::Builder::new()
            .prefix("kmod-build-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let archive_path = scratch.path().join(filename);

        if let Err(e) = self.catalog.fetch_archive(&entry.key, &archive_path) {
            return Ok(ArchiveOutcome::Skipped(format!("fetch failed: {:#}", e)));
        }

        let headers = scratch.path().join("tree");
        let depth = match extract::strip_depth(&archive_path, kind) {
            Ok(depth) => depth,
            Err(e) => return Ok(ArchiveOutcome::Skipped(format!("extract failed: {:#}", e))),
        };
        if let Err(e) = extract::unpack_with_strip(&archive_path, &headers, depth) {
            return Ok(ArchiveOutcome::Skipped(format!("extract failed: {:#}", e)));
        }

        workaround::apply_from(&self.workarounds_dir, &entry.device, &entry.version, &headers);

        let kernel_version = match kernel::kernel_version_from_config(&headers) {
            Ok(v) => v,
            Err(e) => {
                return Ok(ArchiveOutcome::Skipped(format!(
                    "extract failed: {:#}",
                    e
                )))
            }
        };
        println!("  Kernel version: {}", kernel_version);

        let kernel_src =
            kernel::ensure_kernel_source_in(&self.source_cache, &kernel_version, &self.kernel_git)?;

        let kbuild = Kbuild::new(&headers);
        kbuild.run(&KbuildStage::OldConfig)?;
        for module in &req.modules {
            kbuild.enable_module(module)?;
        }
        kbuild.run(&KbuildStage::Prepare)?;
        kbuild.run(&KbuildStage::ModulesPrepare)?;

        let out_base = req
            .dest_dir
            .join(output_dir_name(&entry.device, &entry.version, kind));
        recreate_dir(&out_base)?;

        let module_source = kernel_src.join(&req.module_src);
        process::ensure_exists(&module_source, "Module source in kernel tree")?;
        let module_dir = out_base.join(&req.module_src);
        copy_dir_recursive(&module_source, &module_dir)?;

        // M= must be absolute: make -C changes directory first.
        let module_dir_abs = module_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", module_dir.display()))?;
        kbuild.run(&KbuildStage::Modules {
            module_dir: module_dir_abs,
        })?;

        println!(
            "  Built {} module artifact(s) in {}",
            count_module_artifacts(&module_dir),
            out_base.display()
        );
        Ok(ArchiveOutcome::Built)
    }
}

/// Delete-then-create: each rebuild for a key starts from an empty directory.
fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove old output {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)
                .with_context(|| format!("Failed to copy {}", path.display()))?;
        }
    }

    Ok(())
}

fn count_module_artifacts(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "ko")
                .unwrap_or(false)
        })
        .count()
}
