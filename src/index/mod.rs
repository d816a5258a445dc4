//! Vulnerability index querying.
//!
//! [`IndexClient`] owns everything between a canonical package set and
//! per-batch results: partitioning into bounded batches, a concurrency
//! ceiling on in-flight requests, retry with exponential backoff (honoring a
//! server-provided retry-after delay when present), cancellation, and the
//! defensive matching of response entries back to the requested batch.
//!
//! The single-request wire call is behind [`IndexTransport`], so the retry
//! and batching logic is exercised in tests without a network.

mod ossindex;

pub use ossindex::OssIndexTransport;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, ScanError};
use crate::model::{CanonicalPackage, VulnerabilityFinding};

/// Index response for one purl. A purl absent from a response has no known
/// vulnerabilities.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub purl: String,
    pub findings: Vec<VulnerabilityFinding>,
}

/// A single batch request against the vulnerability index.
#[async_trait]
pub trait IndexTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Queries the index for one batch of purls.
    ///
    /// # Errors
    ///
    /// [`IndexError::Transient`] for timeouts, 5xx, and rate limits (the
    /// client retries these); [`IndexError::Permanent`] for anything a retry
    /// cannot fix.
    async fn query_batch(&self, purls: &[String]) -> Result<Vec<IndexEntry>, IndexError>;
}

/// Result of one batch after the retry loop has run its course.
///
/// An incomplete batch's packages must be reported as "could not be
/// checked", never as clean.
#[derive(Debug)]
pub struct BatchResult {
    pub packages: Vec<CanonicalPackage>,
    pub entries: Vec<IndexEntry>,
    pub complete: bool,
}

impl BatchResult {
    fn incomplete(packages: Vec<CanonicalPackage>) -> Self {
        Self {
            packages,
            entries: Vec::new(),
            complete: false,
        }
    }
}

/// Drives batched queries against an [`IndexTransport`].
pub struct IndexClient {
    transport: Arc<dyn IndexTransport>,
    config: IndexConfig,
}

impl IndexClient {
    pub fn new(transport: Arc<dyn IndexTransport>, config: IndexConfig) -> Self {
        Self { transport, config }
    }

    /// Checks every canonical package, returning one [`BatchResult`] per
    /// issued batch. Batches run concurrently up to the configured ceiling
    /// and may complete in any order.
    ///
    /// Cancelling `cancel` stops new batches from being issued; batches not
    /// yet resolved come back incomplete.
    ///
    /// # Errors
    ///
    /// [`ScanError::IndexAccess`] when the index rejects our credentials:
    /// that fails every batch identically, so the scan aborts rather than
    /// reporting the entire package set as incomplete.
    pub async fn check(
        &self,
        packages: Vec<CanonicalPackage>,
        cancel: CancellationToken,
    ) -> Result<Vec<BatchResult>, ScanError> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.max_batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks: JoinSet<Result<BatchResult, ScanError>> = JoinSet::new();

        for batch in packages.chunks(batch_size) {
            let batch = batch.to_vec();
            let transport = Arc::clone(&self.transport);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Ok(BatchResult::incomplete(batch)),
                };
                run_batch(transport.as_ref(), &config, batch, &cancel).await
            });
        }

        let mut results = Vec::new();
        let mut auth_failure: Option<ScanError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    // Credential rejection: stop issuing further requests and
                    // surface the error once the in-flight set drains.
                    cancel.cancel();
                    auth_failure.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "batch task panicked");
                }
            }
        }
        if let Some(e) = auth_failure {
            return Err(e);
        }
        Ok(results)
    }
}

/// Runs one batch to a terminal state: completed entries, or incomplete
/// after the attempt ceiling, a permanent error, or cancellation.
///
/// Backoff timing is local to the batch; nothing is shared across batches
/// except the semaphore and the cancellation token.
async fn run_batch(
    transport: &dyn IndexTransport,
    config: &IndexConfig,
    batch: Vec<CanonicalPackage>,
    cancel: &CancellationToken,
) -> Result<BatchResult, ScanError> {
    let purls: Vec<String> = batch.iter().map(|p| p.purl.clone()).collect();
    let max_attempts = config.max_retries.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            debug!(batch_size = batch.len(), "scan cancelled before batch was issued");
            return Ok(BatchResult::incomplete(batch));
        }

        debug!(
            attempt,
            max_attempts,
            batch_size = purls.len(),
            index = transport.name(),
            "querying vulnerability index"
        );
        match transport.query_batch(&purls).await {
            Ok(entries) => {
                return Ok(BatchResult {
                    entries: keep_requested(entries, &purls),
                    packages: batch,
                    complete: true,
                });
            }
            Err(e) if e.is_auth() => {
                return Err(ScanError::IndexAccess {
                    reason: e.to_string(),
                });
            }
            Err(IndexError::Permanent { status, reason }) => {
                // Not retryable, but also not credentials: record the batch
                // as incomplete and let the rest of the scan proceed.
                error!(status, reason, "index rejected batch");
                return Ok(BatchResult::incomplete(batch));
            }
            Err(IndexError::Transient {
                reason,
                retry_after,
            }) => {
                if attempt == max_attempts {
                    warn!(
                        reason,
                        attempts = max_attempts,
                        batch_size = batch.len(),
                        "batch exhausted retries, packages will be reported as incomplete"
                    );
                    break;
                }
                // Server-provided retry-after wins over the local schedule.
                let delay = retry_after.unwrap_or_else(|| {
                    config.retry_backoff() * 2u32.saturating_pow(attempt - 1)
                });
                debug!(reason, delay_ms = delay.as_millis() as u64, "retrying batch");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(BatchResult::incomplete(batch)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Ok(BatchResult::incomplete(batch))
}

/// Discards response entries for purls we never asked about in this batch.
/// Protects the report against index response drift.
fn keep_requested(entries: Vec<IndexEntry>, requested: &[String]) -> Vec<IndexEntry> {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let (kept, dropped): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|e| requested.contains(e.purl.as_str()));
    if !dropped.is_empty() {
        warn!(
            count = dropped.len(),
            first = %dropped[0].purl,
            "discarding index response entries for packages not in this batch"
        );
    }
    kept
}
