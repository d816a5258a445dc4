use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Package ecosystem a lock-file entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pypi,
    Npm,
    Cargo,
}

impl Ecosystem {
    /// The `type` segment used in package-URL strings for this ecosystem.
    pub fn purl_type(&self) -> &'static str {
        match self {
            Ecosystem::Pypi => "pypi",
            Ecosystem::Npm => "npm",
            Ecosystem::Cargo => "cargo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Pypi => "PyPI",
            Ecosystem::Npm => "npm",
            Ecosystem::Cargo => "Cargo",
        }
    }

    /// Whether package names compare case-insensitively in this ecosystem.
    pub fn case_insensitive_names(&self) -> bool {
        match self {
            Ecosystem::Pypi | Ecosystem::Npm => true,
            Ecosystem::Cargo => false,
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where a lock-file entry was resolved from.
///
/// Only registry-sourced entries carry a registry version identity; git,
/// path and virtual entries are excluded from vulnerability lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum PackageOrigin {
    Registry {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Git {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rev: Option<String>,
    },
    Local,
    Virtual,
}

impl PackageOrigin {
    pub fn is_registry(&self) -> bool {
        matches!(self, PackageOrigin::Registry { .. })
    }
}

/// One dependency entry as it appears in a single lock file.
///
/// Duplicates across lock files are expected and collapsed downstream by
/// [`crate::normalize::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub ecosystem: Ecosystem,
    pub origin: PackageOrigin,
    /// Repository-relative path of the lock file this entry came from.
    pub source_file: PathBuf,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        ecosystem: Ecosystem,
        origin: PackageOrigin,
        source_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            origin,
            source_file: source_file.into(),
        }
    }
}

/// The deduplicated, package-URL-keyed identity used for index queries.
///
/// Two [`PackageRecord`]s with the same `(ecosystem, name, version)` collapse
/// to exactly one `CanonicalPackage`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalPackage {
    pub purl: String,
    pub name: String,
    pub version: String,
}
