//! Command-line surface.
//!
//! Two commands: `list` prints every published `(device, version)` pair,
//! `build` runs the module build workflow. Flags accept both `--flag=value`
//! and `--flag value` forms.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::build::BuildRequest;

/// Environment fallback for `--device`: fleet devices export their own
/// machine name, so on-device invocations can omit the flag.
pub const MACHINE_NAME_ENV: &str = "KMOD_MACHINE_NAME";

const DEFAULT_DEST_DIR: &str = "output";

pub fn usage() -> &'static str {
    "Usage:\n  \
     kmod-build list\n  \
     kmod-build build --device=NAME --os-version=\"V1 V2 ...\" --src=PATH\n               \
     --modules-list=\"MOD1 MOD2 ...\" [--dest-dir=DIR]\n\n\
     list   print every (device, version) with published kernel archives\n\
     build  build the named modules for each requested OS version\n\n\
     --device       device slug (default: $KMOD_MACHINE_NAME)\n\
     --os-version   space-separated OS versions to build for\n\
     --src          module source subpath inside the kernel tree\n\
     --modules-list space-separated config entries to build as modules\n\
     --dest-dir     output root (default: output)"
}

/// Parsed invocation.
#[derive(Debug)]
pub enum Command {
    List,
    Build(BuildRequest),
}

/// Parse process arguments (without argv[0]).
pub fn parse(args: &[String]) -> Result<Command> {
    let device_fallback = std::env::var(MACHINE_NAME_ENV).ok();
    parse_with_fallback(args, device_fallback)
}

pub fn parse_with_fallback(args: &[String], device_fallback: Option<String>) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n\n{}", usage());
    };

    match command.as_str() {
        "list" => {
            if !rest.is_empty() {
                bail!("`list` takes no arguments\n\n{}", usage());
            }
            Ok(Command::List)
        }
        "build" => parse_build(rest, device_fallback),
        other => bail!("unknown command '{}'\n\n{}", other, usage()),
    }
}

fn parse_build(args: &[String], device_fallback: Option<String>) -> Result<Command> {
    let mut device = None;
    let mut os_versions = None;
    let mut src = None;
    let mut modules_list = None;
    let mut dest_dir = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, value) = match arg.split_once('=') {
            Some((flag, value)) => (flag, value.to_string()),
            None => {
                let Some(value) = iter.next() else {
                    bail!("flag {} requires a value\n\n{}", arg, usage());
                };
                (arg.as_str(), value.clone())
            }
        };

        match flag {
            "--device" => device = Some(value),
            "--os-version" => os_versions = Some(value),
            "--src" => src = Some(value),
            "--modules-list" => modules_list = Some(value),
            "--dest-dir" => dest_dir = Some(value),
            other => bail!("unknown flag '{}'\n\n{}", other, usage()),
        }
    }

    let Some(device) = device.or(device_fallback).filter(|d| !d.is_empty()) else {
        bail!(
            "no device given: pass --device or set ${}\n\n{}",
            MACHINE_NAME_ENV,
            usage()
        );
    };

    let Some(os_versions) = os_versions else {
        bail!("--os-version is required\n\n{}", usage());
    };
    let versions = split_list(&os_versions);
    if versions.is_empty() {
        bail!("--os-version must name at least one version\n\n{}", usage());
    }

    let Some(src) = src else {
        bail!("--src is required\n\n{}", usage());
    };
    let module_src = PathBuf::from(&src);
    if module_src.is_absolute() {
        bail!(
            "--src must be a subpath inside the kernel tree (e.g. drivers/net/wireguard), got '{}'",
            src
        );
    }

    let Some(modules_list) = modules_list else {
        bail!("--modules-list is required\n\n{}", usage());
    };
    let modules = split_list(&modules_list);
    if modules.is_empty() {
        bail!("--modules-list must name at least one module\n\n{}", usage());
    }

    Ok(Command::Build(BuildRequest {
        device,
        versions,
        module_src,
        modules,
        dest_dir: PathBuf::from(dest_dir.unwrap_or_else(|| DEFAULT_DEST_DIR.to_string())),
    }))
}

/// Split a space-separated flag value, deduplicating while keeping request
/// order.
fn split_list(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in value.split_whitespace() {
        if !out.iter().any(|v| v == item) {
            out.push(item.to_string());
        }
    }
    out
}
