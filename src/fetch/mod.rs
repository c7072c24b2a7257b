//! HTTP transport for listing pages and archive downloads.
//!
//! The transport is a trait so catalog and download logic can be tested
//! against a mock without a network. The real implementation is a blocking
//! reqwest client. No timeout is configured: archive downloads on slow device
//! links can legitimately take a long time, and the tool has no resume logic.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Blocking HTTP GET, narrow on purpose.
pub trait HttpClient {
    /// Fetch `url`, returning the response body. Non-2xx is an error.
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Real client backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request failed: {}", url))?;

        if !response.status().is_success() {
            bail!("HTTP {} from {}", response.status(), url);
        }

        let body = response
            .bytes()
            .with_context(|| format!("Failed to read response from {}", url))?;
        Ok(body.to_vec())
    }
}

/// Escape the characters in an object-store key that are unsafe in a URL
/// path. OS versions routinely contain `+` (e.g. `2.53.12+rev1`), which the
/// file-serving endpoint would otherwise decode as a space.
pub fn encode_key(key: &str) -> String {
    key.replace('+', "%2B")
}

/// Download `url` to `dest`, creating parent directories as needed.
pub fn download_to(client: &dyn HttpClient, url: &str, dest: &Path) -> Result<()> {
    let body = client.get(url)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(dest, &body).with_context(|| format!("Failed to write {}", dest.display()))?;
    println!("  Downloaded {} ({} KB)", dest.display(), body.len() / 1024);
    Ok(())
}
