//! Canonicalization of parsed package records.
//!
//! Collapses every [`PackageRecord`] gathered across all lock files into one
//! set of unique [`CanonicalPackage`]s keyed by `(ecosystem, name, version)`,
//! and builds the package-URL string used as the index query key. Entries
//! without a registry identity (git, path, virtual) cannot be looked up in a
//! public index and are counted as skipped.

use std::collections::BTreeMap;

use crate::model::{CanonicalPackage, Ecosystem, PackageRecord};

/// Output of normalization. Deterministically ordered by purl.
#[derive(Debug, Default)]
pub struct Normalized {
    pub packages: Vec<CanonicalPackage>,
    /// Records skipped because they have no registry identity.
    pub skipped_non_registry: usize,
}

/// Deduplicates records across lock files into canonical packages.
///
/// The same package pinned at different versions in different lock files
/// stays as separate canonical packages; only exact
/// `(ecosystem, name, version)` matches collapse.
pub fn normalize(records: &[PackageRecord]) -> Normalized {
    let mut unique: BTreeMap<(Ecosystem, String, String), CanonicalPackage> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        if !record.origin.is_registry() {
            skipped += 1;
            continue;
        }
        let name = canonical_name(record.ecosystem, &record.name);
        let key = (record.ecosystem, name.clone(), record.version.clone());
        unique.entry(key).or_insert_with(|| CanonicalPackage {
            purl: make_purl(record.ecosystem, &name, &record.version),
            name,
            version: record.version.clone(),
        });
    }

    Normalized {
        packages: unique.into_values().collect(),
        skipped_non_registry: skipped,
    }
}

/// Canonical form of a package name within its ecosystem.
///
/// PyPI names follow PEP 503; other case-insensitive ecosystems lowercase.
pub fn canonical_name(ecosystem: Ecosystem, raw: &str) -> String {
    match ecosystem {
        Ecosystem::Pypi => pep503_name(raw),
        _ if ecosystem.case_insensitive_names() => raw.trim().to_lowercase(),
        _ => raw.trim().to_string(),
    }
}

/// PEP 503 normalization: lowercase, with runs of `-`, `_` and `.` collapsed
/// to a single `-`. Runs at either end of the name still collapse to `-`
/// rather than disappearing, matching the reference substitution.
pub fn pep503_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;
    for c in raw.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            in_separator = true;
        } else {
            if in_separator {
                out.push('-');
            }
            in_separator = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        }
    }
    if in_separator {
        out.push('-');
    }
    out
}

/// Builds a `pkg:<type>/<name>@<version>` package-URL string.
pub fn make_purl(ecosystem: Ecosystem, name: &str, version: &str) -> String {
    format!(
        "pkg:{}/{}@{}",
        ecosystem.purl_type(),
        purl_encode(name),
        purl_encode(version)
    )
}

/// Percent-encodes a purl name or version component.
///
/// The purl spec requires `#`, `?`, `@`, `:` and other URL-reserved
/// characters to be encoded inside components; unreserved characters and
/// `+` (common in local version labels) pass through.
fn purl_encode(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' | b'~' | b'+' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
