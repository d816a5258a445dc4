use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::ParseWarning;
use crate::model::CanonicalPackage;

/// Severity of a vulnerability finding.
///
/// Variants are ordered so that `Critical` compares greatest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported advisory for a specific package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    /// Package-URL of the affected package.
    pub purl: String,
    /// Advisory identifier (CVE where available, otherwise the index's id).
    pub advisory_id: String,
    pub title: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_range: Option<String>,
}

/// Terminal per-package state in a finished report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    /// Checked against the index, no known vulnerabilities.
    Clean,
    /// Checked against the index, at least one finding.
    Vulnerable,
    /// Could not be checked (exhausted retries or cancelled scan).
    ///
    /// Never to be confused with [`PackageStatus::Clean`].
    Incomplete,
}

/// Consolidated result of one scan invocation.
///
/// Invariants: every purl key in `findings` belongs to a package in
/// `scanned`, and `findings` keys and `incomplete` members are disjoint. A
/// scanned purl absent from both is clean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned: BTreeSet<CanonicalPackage>,
    /// Findings keyed by purl, ordered by advisory id within each package.
    pub findings: BTreeMap<String, Vec<VulnerabilityFinding>>,
    /// Purls whose vulnerability status could not be determined.
    pub incomplete: BTreeSet<String>,
    /// Repository-relative paths of the lock files that were scanned.
    pub lock_files: Vec<PathBuf>,
    /// Malformed lock-file entries that were skipped during parsing.
    pub warnings: Vec<ParseWarning>,
    /// Lock-file entries without a registry identity (git/path/virtual).
    pub skipped_non_registry: usize,
    pub timestamp: DateTime<Utc>,
}

impl ScanReport {
    /// Terminal status of a scanned purl, or `None` if it was never scanned.
    pub fn status(&self, purl: &str) -> Option<PackageStatus> {
        if !self.scanned.iter().any(|p| p.purl == purl) {
            return None;
        }
        if self.findings.contains_key(purl) {
            Some(PackageStatus::Vulnerable)
        } else if self.incomplete.contains(purl) {
            Some(PackageStatus::Incomplete)
        } else {
            Some(PackageStatus::Clean)
        }
    }

    pub fn finding_count(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn vulnerable_package_count(&self) -> usize {
        self.findings.len()
    }

    /// Highest severity across all findings, `None` when there are none.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings
            .values()
            .flatten()
            .map(|f| f.severity)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(purl: &str, id: &str, severity: Severity) -> VulnerabilityFinding {
        VulnerabilityFinding {
            purl: purl.to_string(),
            advisory_id: id.to_string(),
            title: "test".to_string(),
            severity,
            cvss_score: None,
            references: Vec::new(),
            affected_range: None,
        }
    }

    fn package(purl: &str) -> CanonicalPackage {
        CanonicalPackage {
            purl: purl.to_string(),
            name: "pkg".to_string(),
            version: "1.0.0".to_string(),
        }
    }

    fn report() -> ScanReport {
        let vulnerable = "pkg:pypi/requests@2.25.0";
        let incomplete = "pkg:pypi/foo@1.0.0";
        let clean = "pkg:pypi/anyio@4.3.0";
        let mut findings = BTreeMap::new();
        findings.insert(
            vulnerable.to_string(),
            vec![
                finding(vulnerable, "CVE-2023-32681", Severity::Medium),
                finding(vulnerable, "CVE-2024-35195", Severity::High),
            ],
        );
        ScanReport {
            scanned: [vulnerable, incomplete, clean].iter().map(|p| package(p)).collect(),
            findings,
            incomplete: [incomplete.to_string()].into_iter().collect(),
            lock_files: vec![PathBuf::from("uv.lock")],
            warnings: Vec::new(),
            skipped_non_registry: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Unknown);
    }

    #[test]
    fn test_status_distinguishes_terminal_states() {
        let report = report();
        assert_eq!(
            report.status("pkg:pypi/requests@2.25.0"),
            Some(PackageStatus::Vulnerable)
        );
        assert_eq!(
            report.status("pkg:pypi/foo@1.0.0"),
            Some(PackageStatus::Incomplete)
        );
        assert_eq!(
            report.status("pkg:pypi/anyio@4.3.0"),
            Some(PackageStatus::Clean)
        );
        assert_eq!(report.status("pkg:pypi/never-scanned@0.1.0"), None);
    }

    #[test]
    fn test_counts_and_max_severity() {
        let report = report();
        assert_eq!(report.finding_count(), 2);
        assert_eq!(report.vulnerable_package_count(), 1);
        assert_eq!(report.max_severity(), Some(Severity::High));
    }
}
