//! Error taxonomy for the scan pipeline.
//!
//! Only [`ScanError`] variants abort a scan. Everything else degrades into
//! the report: malformed lock entries become [`ParseWarning`]s, transient
//! index failures are retried, and exhausted batches mark their packages
//! incomplete rather than clean.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal (or caller-reportable) pipeline errors.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No lock files were found. Reportable as "no dependencies detected",
    /// not a crash.
    #[error("no lock files named `{lockfile}` found in {repo}")]
    NoLockFiles { repo: String, lockfile: String },

    /// The repository could not be read at all (missing, private without
    /// credentials, or the host rejected us).
    #[error("cannot read repository {repo}: {reason}")]
    RepoAccess { repo: String, reason: String },

    /// The repository reference itself is unusable.
    #[error("invalid repository reference `{reference}`: {reason}")]
    InvalidRepoRef { reference: String, reason: String },

    /// The vulnerability index rejected our credentials outright. Since this
    /// fails every batch identically, the scan aborts instead of reporting
    /// the whole package set as incomplete.
    #[error("vulnerability index rejected the request: {reason}")]
    IndexAccess { reason: String },
}

/// Transport-level outcome of a single batch request, consumed by the retry
/// loop in [`crate::index::IndexClient`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// Timeout, 5xx, or rate limit. Retried with backoff; a rate-limit
    /// response may carry the server's requested delay.
    #[error("transient index failure: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// The index refused the request in a way a retry cannot fix.
    #[error("index rejected the request (HTTP {status}): {reason}")]
    Permanent { status: u16, reason: String },
}

impl IndexError {
    pub fn is_auth(&self) -> bool {
        matches!(self, IndexError::Permanent { status: 401 | 403, .. })
    }
}

/// A malformed lock-file entry that was skipped. Recorded on the report so
/// one bad block never silently loses the rest of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// Lock file the entry came from.
    pub file: PathBuf,
    /// 1-based index of the `[[package]]` block within the file.
    pub block: usize,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: package block {}: {}",
            self.file.display(),
            self.block,
            self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_is_auth() {
        let unauthorized = IndexError::Permanent {
            status: 401,
            reason: "bad credentials".to_string(),
        };
        let forbidden = IndexError::Permanent {
            status: 403,
            reason: "forbidden".to_string(),
        };
        let bad_request = IndexError::Permanent {
            status: 400,
            reason: "malformed coordinates".to_string(),
        };
        let transient = IndexError::Transient {
            reason: "timeout".to_string(),
            retry_after: None,
        };
        assert!(unauthorized.is_auth());
        assert!(forbidden.is_auth());
        assert!(!bad_request.is_auth());
        assert!(!transient.is_auth());
    }

    #[test]
    fn test_parse_warning_display() {
        let warning = ParseWarning {
            file: PathBuf::from("sub/uv.lock"),
            block: 3,
            reason: "missing `version`".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "sub/uv.lock: package block 3: missing `version`"
        );
    }
}
