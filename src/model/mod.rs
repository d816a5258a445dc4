//! Core data types for packages, findings, and scan reports.
//!
//! - [`PackageRecord`] - one dependency entry from one lock file
//! - [`CanonicalPackage`] - deduplicated, purl-keyed package identity
//! - [`VulnerabilityFinding`] - one advisory matched to a package version
//! - [`ScanReport`] - consolidated result of a scan invocation
//!
//! All of these are created fresh per scan and carry no cross-scan state.

mod package;
mod report;

pub use package::*;
pub use report::*;
