//! Archive extraction with heuristic strip depth.
//!
//! Two generations of source archives exist with different internal layouts,
//! and headers-only archives use a third. Rather than hardcode per-version
//! knowledge, the strip depth is chosen by inspecting the archive itself:
//!
//! - headers-only archive: strip 1 component
//! - source archive whose second entry path has no digit: strip 2
//! - source archive whose second entry path has a digit: strip 3
//!
//! The digit check distinguishes layouts rooted at e.g. `build/linux-5.10.95/`
//! from ones rooted at a plain directory name. Treat it as a fixed rule, not
//! something to refine.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// What a published archive contains, judged from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Pre-generated kernel headers, enough to compile modules against.
    Headers,
    /// Full kernel source tarball.
    FullSource,
}

impl ArchiveKind {
    /// Filename rule: anything containing `source` is a full-source archive.
    pub fn from_filename(filename: &str) -> Self {
        if filename.contains("source") {
            ArchiveKind::FullSource
        } else {
            ArchiveKind::Headers
        }
    }

    /// Suffix appended to the output directory name so full-source builds
    /// never collide with headers-only builds of the same version.
    pub fn output_suffix(self) -> &'static str {
        match self {
            ArchiveKind::Headers => "",
            ArchiveKind::FullSource => "_from_src",
        }
    }
}

/// Decide how many leading path components to drop when extracting.
///
/// Source archives are opened and their second-listed entry inspected; see
/// the module docs for the rule. Archives with fewer than two entries fall
/// back to depth 2.
pub fn strip_depth(archive: &Path, kind: ArchiveKind) -> Result<usize> {
    if kind == ArchiveKind::Headers {
        return Ok(1);
    }

    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut entries = tar
        .entries()
        .with_context(|| format!("Failed to read archive {}", archive.display()))?;

    let Some(second) = entries.nth(1) else {
        return Ok(2);
    };
    let second = second.with_context(|| format!("Corrupt entry in {}", archive.display()))?;
    let path = second
        .path()
        .with_context(|| format!("Unreadable entry path in {}", archive.display()))?;

    let has_digit = path.to_string_lossy().chars().any(|c| c.is_ascii_digit());
    Ok(if has_digit { 3 } else { 2 })
}

/// Unpack a gzipped tarball into `dest`, dropping `depth` leading path
/// components from every entry. Entries entirely consumed by the strip
/// (e.g. the root directory itself) are skipped.
pub fn unpack_with_strip(archive: &Path, dest: &Path, depth: usize) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let mut unpacked = 0usize;
    for entry in tar
        .entries()
        .with_context(|| format!("Failed to read archive {}", archive.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("Corrupt entry in {}", archive.display()))?;
        let path = entry
            .path()
            .with_context(|| format!("Unreadable entry path in {}", archive.display()))?
            .into_owned();

        let stripped: PathBuf = path.components().skip(depth).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("Failed to unpack {}", stripped.display()))?;
        unpacked += 1;
    }

    println!(
        "  Extracted {} entries into {} (strip depth {})",
        unpacked,
        dest.display(),
        depth
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// Build a gzipped tarball whose entries are the given (path, contents)
    /// pairs, in order.
    fn make_archive(dest: &Path, entries: &[(&str, &str)]) {
        let file = File::create(dest).unwrap();
        let encoder = GzEncoder::new(file, Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn headers_archive_strips_one() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("kernel_modules_headers.tar.gz");
        make_archive(&archive, &[("build/Makefile", ""), ("build/.config", "")]);

        assert_eq!(strip_depth(&archive, ArchiveKind::Headers).unwrap(), 1);
    }

    #[test]
    fn source_archive_with_alphabetic_layout_strips_two() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("kernel_source.tar.gz");
        make_archive(
            &archive,
            &[("build/kernel/Makefile", ""), ("build/kernel/.config", "")],
        );

        assert_eq!(strip_depth(&archive, ArchiveKind::FullSource).unwrap(), 2);
    }

    #[test]
    fn source_archive_with_versioned_layout_strips_three() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("kernel_source.tar.gz");
        make_archive(
            &archive,
            &[
                ("build/linux-5.10.95/Makefile", ""),
                ("build/linux-5.10.95/.config", ""),
            ],
        );

        assert_eq!(strip_depth(&archive, ArchiveKind::FullSource).unwrap(), 3);
    }

    #[test]
    fn unpack_drops_leading_components() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar.gz");
        make_archive(
            &archive,
            &[
                ("build/kernel/Makefile", "obj-m := hello.o\n"),
                ("build/kernel/scripts/config", "#!/bin/sh\n"),
            ],
        );

        let out = dir.path().join("out");
        unpack_with_strip(&archive, &out, 2).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("Makefile")).unwrap(),
            "obj-m := hello.o\n"
        );
        assert!(out.join("scripts/config").is_file());
        assert!(!out.join("build").exists());
    }

    #[test]
    fn unpack_skips_entries_consumed_by_strip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar.gz");
        make_archive(&archive, &[("top", "x"), ("top2/file", "y")]);

        let out = dir.path().join("out");
        unpack_with_strip(&archive, &out, 1).unwrap();

        assert!(out.join("file").is_file());
        assert!(!out.join("top").exists());
    }

    #[test]
    fn kind_from_filename() {
        assert_eq!(
            ArchiveKind::from_filename("kernel_source.tar.gz"),
            ArchiveKind::FullSource
        );
        assert_eq!(
            ArchiveKind::from_filename("kernel_modules_headers.tar.gz"),
            ArchiveKind::Headers
        );
    }

    #[test]
    fn truncated_archive_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, b"not a gzip stream").unwrap();

        assert!(unpack_with_strip(&archive, &dir.path().join("out"), 1).is_err());
    }
}
