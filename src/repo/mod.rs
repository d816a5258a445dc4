//! Repository sources and lock-file discovery.
//!
//! A [`RepoSource`] abstracts "list files with this exact name" and "read
//! this file" over a repository reference. Two sources are provided:
//!
//! | Source | Backing |
//! |--------|---------|
//! | [`GithubRepo`] | GitHub REST API (git trees + contents) |
//! | [`LocalRepo`] | local checkout, recursive directory walk |

mod github;
mod local;

pub use github::GithubRepo;
pub use local::LocalRepo;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ScanError;

/// A discovered lock file: repository-relative path plus raw text.
#[derive(Debug, Clone)]
pub struct LockFile {
    pub path: PathBuf,
    pub content: String,
}

/// Read-only access to a repository's file tree.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Human-readable identifier for error messages ("owner/repo@ref", a
    /// directory path, ...).
    fn describe(&self) -> String;

    /// Lists repository-relative paths of files whose filename matches
    /// `file_name` exactly, anywhere in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::RepoAccess`] if the repository cannot be read.
    async fn list_files(&self, file_name: &str) -> Result<Vec<PathBuf>, ScanError>;

    /// Reads one file's content as UTF-8 text.
    async fn read_file(&self, path: &Path) -> Result<String, ScanError>;
}

/// Discovers all lock files in a repository.
///
/// A repository may contain several manifests at different paths (monorepo);
/// all of them are returned, in listing order.
///
/// # Errors
///
/// Returns [`ScanError::NoLockFiles`] when zero files match (a reportable
/// "no dependencies detected" condition) and propagates
/// [`ScanError::RepoAccess`] from the underlying source.
pub async fn locate_lock_files(
    repo: &dyn RepoSource,
    file_name: &str,
) -> Result<Vec<LockFile>, ScanError> {
    let paths = repo.list_files(file_name).await?;
    if paths.is_empty() {
        return Err(ScanError::NoLockFiles {
            repo: repo.describe(),
            lockfile: file_name.to_string(),
        });
    }
    let mut lock_files = Vec::with_capacity(paths.len());
    for path in paths {
        debug!(path = %path.display(), "reading lock file");
        let content = repo.read_file(&path).await?;
        lock_files.push(LockFile { path, content });
    }
    Ok(lock_files)
}

/// True when `path`'s final component equals `file_name` exactly.
pub(crate) fn file_name_matches(path: &Path, file_name: &str) -> bool {
    path.file_name().map(|n| n == file_name).unwrap_or(false)
}
