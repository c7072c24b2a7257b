//! Object-store key grammar.
//!
//! Published archive keys follow the shape:
//!
//! ```text
//! [esr-]images/<device>/<version>/<filename>
//! ```
//!
//! where `<filename>` is a kernel header or kernel source tarball. The parser
//! rejects anything else with a typed error so callers can distinguish "not
//! an archive key" from "archive key for the wrong device".

/// Marker prefix for extended-support-release image buckets.
const ESR_PREFIX: &str = "esr-";
const IMAGES_SEGMENT: &str = "images";

/// One published kernel archive, parsed from its object-store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Raw object-store key, exactly as listed.
    pub key: String,
    /// Device slug (first path segment under `images/`).
    pub device: String,
    /// OS version (second path segment under `images/`).
    pub version: String,
    /// Whether the archive carries full kernel source rather than headers only.
    pub is_source_archive: bool,
}

/// Why a key was rejected by the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key does not start with 'images/': {0}")]
    MissingImagesPrefix(String),
    #[error("key is not a kernel archive: {0}")]
    NotKernelArchive(String),
    #[error("key is missing device/version/filename segments: {0}")]
    Truncated(String),
}

/// Parse an object-store key into a [`CatalogEntry`].
///
/// A leading `esr-` marker is stripped before matching. The key must then
/// start with `images/`, contain the substring `kernel`, and carry at least
/// device, version and filename segments.
pub fn parse_key(key: &str) -> Result<CatalogEntry, KeyError> {
    let trimmed = key.strip_prefix(ESR_PREFIX).unwrap_or(key);

    let mut segments = trimmed.split('/');
    if segments.next() != Some(IMAGES_SEGMENT) {
        return Err(KeyError::MissingImagesPrefix(key.to_string()));
    }

    if !key.contains("kernel") {
        return Err(KeyError::NotKernelArchive(key.to_string()));
    }

    let device = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KeyError::Truncated(key.to_string()))?;
    let version = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KeyError::Truncated(key.to_string()))?;
    let filename = segments
        .next_back()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KeyError::Truncated(key.to_string()))?;

    Ok(CatalogEntry {
        key: key.to_string(),
        device: device.to_string(),
        version: version.to_string(),
        is_source_archive: filename.contains("source"),
    })
}
