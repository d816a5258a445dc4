//! The scan pipeline: locate → parse → normalize → query → aggregate.
//!
//! [`Pipeline`] is the library entry point. It owns no global state; the
//! repository source and index transport are injected, so callers (and
//! tests) can swap either side out.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::index::{IndexClient, IndexTransport, OssIndexTransport};
use crate::lockfile::parse_lock_file;
use crate::model::ScanReport;
use crate::normalize::normalize;
use crate::repo::{locate_lock_files, GithubRepo, LocalRepo, RepoSource};
use crate::report::ReportBuilder;

/// One configured scan, ready to run.
pub struct Pipeline {
    repo: Box<dyn RepoSource>,
    transport: Arc<dyn IndexTransport>,
    config: ScanConfig,
}

impl Pipeline {
    pub fn new(
        repo: Box<dyn RepoSource>,
        transport: Arc<dyn IndexTransport>,
        config: ScanConfig,
    ) -> Self {
        Self {
            repo,
            transport,
            config,
        }
    }

    /// Convenience constructor for a GitHub repository URL with the default
    /// OSS Index transport.
    pub fn for_github_url(url: &str, config: ScanConfig) -> Result<Self, ScanError> {
        let repo = GithubRepo::from_url(url, &config.github)?;
        let transport = OssIndexTransport::new(&config.index)?;
        Ok(Self::new(Box::new(repo), Arc::new(transport), config))
    }

    /// Convenience constructor for a local checkout with the default OSS
    /// Index transport.
    pub fn for_local_path(
        path: impl Into<std::path::PathBuf>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        let transport = OssIndexTransport::new(&config.index)?;
        Ok(Self::new(
            Box::new(LocalRepo::new(path)),
            Arc::new(transport),
            config,
        ))
    }

    /// Runs the scan to completion (or cancellation).
    ///
    /// Cancelling `cancel` stops new index batches from being issued;
    /// packages from abandoned batches appear in the report's incomplete
    /// set, never as clean.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NoLockFiles`]: no dependencies detected; reportable,
    ///   not a crash
    /// - [`ScanError::RepoAccess`]: the repository could not be read
    /// - [`ScanError::IndexAccess`]: the index rejected our credentials
    pub async fn run(&self, cancel: CancellationToken) -> Result<ScanReport, ScanError> {
        let lock_files =
            locate_lock_files(self.repo.as_ref(), &self.config.lockfile_name).await?;
        info!(
            repo = %self.repo.describe(),
            count = lock_files.len(),
            "discovered lock files"
        );

        let mut builder = ReportBuilder::new();
        let mut records = Vec::new();
        for lock_file in &lock_files {
            let parsed = parse_lock_file(&lock_file.path, &lock_file.content);
            for warning in &parsed.warnings {
                warn!(%warning, "skipped malformed lock entry");
            }
            builder.record_lock_file(lock_file.path.clone());
            builder.record_warnings(parsed.warnings);
            records.extend(parsed.records);
        }

        let normalized = normalize(&records);
        builder.record_skipped(normalized.skipped_non_registry);
        info!(
            entries = records.len(),
            unique = normalized.packages.len(),
            skipped_non_registry = normalized.skipped_non_registry,
            "normalized package set"
        );

        let client = IndexClient::new(Arc::clone(&self.transport), self.config.index.clone());
        for batch in client.check(normalized.packages, cancel).await? {
            builder.merge_batch(batch);
        }

        let report = builder.finish();
        info!(
            scanned = report.scanned.len(),
            vulnerable = report.vulnerable_package_count(),
            findings = report.finding_count(),
            incomplete = report.incomplete.len(),
            "scan complete"
        );
        Ok(report)
    }
}
