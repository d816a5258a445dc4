//! Report aggregation.
//!
//! [`ReportBuilder`] merges per-batch results into one [`ScanReport`]. The
//! merge is idempotent and commutative: merging the same batch twice, or
//! merging batches in any order, produces the same report. Findings are
//! keyed by `(purl, advisory id)` and the incomplete set is sticky over
//! clean results, so an exhausted batch can never be laundered into
//! "no vulnerabilities found" by another batch's clean outcome.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::warn;

use crate::error::ParseWarning;
use crate::index::BatchResult;
use crate::model::{CanonicalPackage, ScanReport, VulnerabilityFinding};

/// Accumulates batch results and scan metadata into a [`ScanReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    scanned: BTreeSet<CanonicalPackage>,
    // purl -> advisory id -> finding; keyed so repeat merges are no-ops
    findings: BTreeMap<String, BTreeMap<String, VulnerabilityFinding>>,
    incomplete: BTreeSet<String>,
    lock_files: Vec<PathBuf>,
    warnings: Vec<ParseWarning>,
    skipped_non_registry: usize,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lock_file(&mut self, path: PathBuf) {
        if !self.lock_files.contains(&path) {
            self.lock_files.push(path);
        }
    }

    pub fn record_warnings(&mut self, warnings: Vec<ParseWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.skipped_non_registry += count;
    }

    /// Merges one batch result. Order of merges does not matter.
    pub fn merge_batch(&mut self, batch: BatchResult) {
        let batch_purls: BTreeSet<&str> =
            batch.packages.iter().map(|p| p.purl.as_str()).collect();

        if batch.complete {
            for entry in batch.entries {
                if entry.findings.is_empty() {
                    continue;
                }
                if !batch_purls.contains(entry.purl.as_str()) {
                    // the index client already filters these; last line of defense
                    warn!(purl = %entry.purl, "dropping finding for package outside its batch");
                    continue;
                }
                let by_advisory = self.findings.entry(entry.purl).or_default();
                for finding in entry.findings {
                    by_advisory.insert(finding.advisory_id.clone(), finding);
                }
            }
        } else {
            for package in &batch.packages {
                self.incomplete.insert(package.purl.clone());
            }
        }

        self.scanned.extend(batch.packages);
    }

    /// Finalizes the report.
    ///
    /// Resolution of conflicting terminal states happens here, not during
    /// merge, so it cannot depend on merge order: a purl with confirmed
    /// findings is vulnerable (positive evidence wins); otherwise membership
    /// in any failed batch makes it incomplete; otherwise it is clean.
    pub fn finish(mut self) -> ScanReport {
        for purl in self.findings.keys() {
            self.incomplete.remove(purl);
        }
        ScanReport {
            scanned: self.scanned,
            findings: self
                .findings
                .into_iter()
                .map(|(purl, by_advisory)| (purl, by_advisory.into_values().collect()))
                .collect(),
            incomplete: self.incomplete,
            lock_files: self.lock_files,
            warnings: self.warnings,
            skipped_non_registry: self.skipped_non_registry,
            timestamp: Utc::now(),
        }
    }
}
