//! Published-archive catalog.
//!
//! Device images land in an unauthenticated S3-style bucket behind a
//! file-serving endpoint. The endpoint's directory listing is standard
//! `ListBucketResult` XML; we page through it with `marker` and parse every
//! key against the grammar in [`key`]. Keys that fail the grammar are dropped
//! silently; the bucket holds plenty of non-kernel objects.
//!
//! The catalog never caches: every listing call re-queries the store.

pub mod key;

pub use key::{parse_key, CatalogEntry, KeyError};

use anyhow::{Context, Result};
use regex::Regex;

use crate::fetch::{self, HttpClient};

/// Default file-serving endpoint fronting the image bucket.
pub const DEFAULT_ENDPOINT: &str = "https://files.balena-cloud.com";

/// Environment override for the file-serving endpoint.
pub const ENDPOINT_ENV: &str = "KMOD_ENDPOINT";

/// Read path over the object-store listing.
pub struct Catalog {
    client: Box<dyn HttpClient>,
    endpoint: String,
}

impl Catalog {
    pub fn new(client: Box<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    /// Construct against the default endpoint, honoring `KMOD_ENDPOINT`.
    pub fn from_env(client: Box<dyn HttpClient>) -> Self {
        let endpoint =
            std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(client, endpoint)
    }

    /// List every key in the bucket, paging until the store reports the
    /// listing is complete. Returns the bucket name alongside the keys.
    pub fn list_keys(&self) -> Result<(String, Vec<String>)> {
        let key_re = Regex::new(r"<Key>([^<]+)</Key>").context("key listing pattern")?;
        let name_re = Regex::new(r"<Name>([^<]+)</Name>").context("bucket name pattern")?;

        let mut keys = Vec::new();
        let mut bucket = String::new();
        let mut marker = String::new();

        loop {
            let url = if marker.is_empty() {
                format!("{}/", self.endpoint)
            } else {
                format!("{}/?marker={}", self.endpoint, fetch::encode_key(&marker))
            };

            let body = self.client.get(&url)?;
            let page = String::from_utf8_lossy(&body);

            if bucket.is_empty() {
                if let Some(m) = name_re.captures(&page) {
                    bucket = m[1].to_string();
                }
            }

            let before = keys.len();
            for m in key_re.captures_iter(&page) {
                keys.push(m[1].to_string());
            }

            let truncated = page.contains("<IsTruncated>true</IsTruncated>");
            if !truncated || keys.len() == before {
                break;
            }
            marker = keys[keys.len() - 1].clone();
        }

        Ok((bucket, keys))
    }

    /// All kernel archive entries, optionally narrowed to an exact device
    /// and/or version. Malformed keys are dropped.
    pub fn list_entries(
        &self,
        device: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<CatalogEntry>> {
        let (_, keys) = self.list_keys()?;

        let entries = keys
            .iter()
            .filter_map(|k| parse_key(k).ok())
            .filter(|e| device.map_or(true, |d| e.device == d))
            .filter(|e| version.map_or(true, |v| e.version == v))
            .collect();
        Ok(entries)
    }

    /// Archive keys to build for `(device, version)`: full-source archives
    /// only. Headers-only archives are listed but never selected here.
    pub fn resolve_archives(&self, device: &str, version: &str) -> Result<Vec<CatalogEntry>> {
        let entries = self
            .list_entries(Some(device), Some(version))?
            .into_iter()
            .filter(|e| e.is_source_archive)
            .collect();
        Ok(entries)
    }

    /// Fetch URL for a listed key. `+` in version strings must be escaped or
    /// the endpoint serves a 404.
    pub fn archive_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, fetch::encode_key(key))
    }

    /// Download one archive into `dest`.
    pub fn fetch_archive(&self, key: &str, dest: &std::path::Path) -> Result<()> {
        let url = self.archive_url(key);
        println!("  Fetching {}", url);
        fetch::download_to(self.client.as_ref(), &url, dest)
    }
}

/// One row per `(device, version)` pair found in the catalog, in listing
/// order. Duplicates in the listing stay duplicated. Returns the discovered
/// bucket name alongside the rows.
pub fn version_rows(catalog: &Catalog) -> Result<(String, Vec<String>)> {
    let (bucket, keys) = catalog.list_keys()?;
    let rows = keys
        .iter()
        .filter_map(|k| parse_key(k).ok())
        .map(|e| format!("{:<32} {}", e.device, e.version))
        .collect();
    Ok((bucket, rows))
}

/// Print the version rows to stdout. The bucket name goes to stderr so the
/// row output stays machine-consumable; an empty catalog prints no rows.
pub fn print_versions(catalog: &Catalog) -> Result<()> {
    let (bucket, rows) = version_rows(catalog)?;
    if !bucket.is_empty() {
        eprintln!("Listing kernel archives in bucket '{}'", bucket);
    }
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::MockHttpClient;

    fn page(name: &str, truncated: bool, keys: &[&str]) -> String {
        let contents: String = keys
            .iter()
            .map(|k| format!("<Contents><Key>{}</Key></Contents>", k))
            .collect();
        format!(
            "<?xml version=\"1.0\"?><ListBucketResult><Name>{}</Name>\
             <IsTruncated>{}</IsTruncated>{}</ListBucketResult>",
            name, truncated, contents
        )
    }

    #[test]
    fn lists_keys_across_pages() {
        let client = MockHttpClient::new(vec![
            Ok(page(
                "device-images",
                true,
                &["images/nuc/1.0.0/kernel_modules_headers.tar.gz"],
            )
            .into_bytes()),
            Ok(page(
                "device-images",
                false,
                &["images/nuc/2.0.0/kernel_modules_headers.tar.gz"],
            )
            .into_bytes()),
        ]);
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let (bucket, keys) = catalog.list_keys().unwrap();
        assert_eq!(bucket, "device-images");
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn second_page_request_carries_encoded_marker() {
        let client = MockHttpClient::new(vec![
            Ok(page("b", true, &["images/nuc/1.0.0+rev1/kernel_a.tar.gz"]).into_bytes()),
            Ok(page("b", false, &[]).into_bytes()),
        ]);
        let requests = client.requests();
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        catalog.list_keys().unwrap();

        let requests = requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], "http://store.invalid/");
        assert_eq!(
            requests[1],
            "http://store.invalid/?marker=images/nuc/1.0.0%2Brev1/kernel_a.tar.gz"
        );
    }

    #[test]
    fn entries_filter_to_kernel_archives() {
        let client = MockHttpClient::single(&page(
            "b",
            false,
            &[
                "images/nuc/1.0.0/kernel_modules_headers.tar.gz",
                "images/nuc/1.0.0/resin-image.docker",
                "logs/nuc/1.0.0/kernel.log",
            ],
        ));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let entries = catalog.list_entries(None, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device, "nuc");
    }

    #[test]
    fn entries_narrow_by_device_and_version() {
        let client = MockHttpClient::single(&page(
            "b",
            false,
            &[
                "images/nuc/1.0.0/kernel_modules_headers.tar.gz",
                "images/nuc/2.0.0/kernel_modules_headers.tar.gz",
                "images/rpi/1.0.0/kernel_modules_headers.tar.gz",
            ],
        ));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let entries = catalog.list_entries(Some("nuc"), Some("2.0.0")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "2.0.0");
    }

    #[test]
    fn resolve_archives_selects_source_only() {
        let client = MockHttpClient::single(&page(
            "b",
            false,
            &[
                "images/nuc/1.0.0/kernel_modules_headers.tar.gz",
                "images/nuc/1.0.0/kernel_source.tar.gz",
            ],
        ));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let archives = catalog.resolve_archives("nuc", "1.0.0").unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].is_source_archive);
        assert!(archives[0].key.contains("kernel_source"));
    }

    #[test]
    fn empty_catalog_lists_nothing() {
        let client = MockHttpClient::single(&page("b", false, &[]));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");
        assert!(catalog.list_entries(None, None).unwrap().is_empty());
    }

    #[test]
    fn empty_catalog_yields_zero_version_rows() {
        let client = MockHttpClient::single(&page("b", false, &[]));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let (bucket, rows) = version_rows(&catalog).unwrap();
        assert_eq!(bucket, "b");
        assert!(rows.is_empty());
    }

    #[test]
    fn version_rows_align_device_and_version() {
        let client = MockHttpClient::single(&page(
            "b",
            false,
            &[
                "images/nuc/1.0.0/kernel_modules_headers.tar.gz",
                "images/nuc/1.0.0/kernel_source.tar.gz",
                "logs/nuc/1.0.0/kernel.log",
            ],
        ));
        let catalog = Catalog::new(Box::new(client), "http://store.invalid");

        let (_, rows) = version_rows(&catalog).unwrap();
        // One row per archive key, non-archive keys dropped.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], format!("{:<32} {}", "nuc", "1.0.0"));
    }

    #[test]
    fn archive_url_percent_encodes_plus() {
        let client = MockHttpClient::new(vec![]);
        let catalog = Catalog::new(Box::new(client), "http://store.invalid/");
        assert_eq!(
            catalog.archive_url("images/nuc/2.53.12+rev1.dev/kernel_source.tar.gz"),
            "http://store.invalid/images/nuc/2.53.12%2Brev1.dev/kernel_source.tar.gz"
        );
    }
}
