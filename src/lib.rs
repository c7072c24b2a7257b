//! Out-of-tree kernel module builder for fleet devices.
//!
//! Device images publish their kernel header and source archives to an
//! unauthenticated object store, keyed by device type and OS version. This
//! crate discovers those archives, extracts them, provisions a matching
//! kernel source checkout, and builds a named set of in-tree modules
//! out-of-tree against the extracted headers.
//!
//! # Workflow
//!
//! ```text
//! catalog ── list archive keys, parse (device, version) pairs
//!    │
//! fetch ──── download a selected source archive to a scratch dir
//!    │
//! extract ── unpack with a heuristic strip depth
//!    │
//! kernel ─── parse kernel version from .config, clone matching source
//!    │
//! build ──── oldconfig, enable modules, prepare, M= module build
//! ```
//!
//! The binary front-end exposes two commands: `list` (print every published
//! (device, version) pair) and `build` (build modules for a set of versions).

pub mod build;
pub mod catalog;
pub mod cli;
pub mod extract;
pub mod fetch;
pub mod kernel;
pub mod preflight;
pub mod process;
pub mod workaround;

pub use build::{BuildRequest, RunReport};
pub use catalog::{Catalog, CatalogEntry};
