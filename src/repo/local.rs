use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{file_name_matches, RepoSource};
use crate::error::ScanError;

/// Repository source backed by a local checkout.
///
/// Lets the pipeline run against an already-cloned working tree without any
/// network access to the repository host.
pub struct LocalRepo {
    root: PathBuf,
}

impl LocalRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn access_error(&self, reason: impl Into<String>) -> ScanError {
        ScanError::RepoAccess {
            repo: self.describe(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RepoSource for LocalRepo {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn list_files(&self, file_name: &str) -> Result<Vec<PathBuf>, ScanError> {
        if !self.root.is_dir() {
            return Err(self.access_error("not a directory"));
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| self.access_error(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if file_name_matches(entry.path(), file_name) {
                let relative = entry
                    .path()
                    .strip_prefix(&self.root)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                paths.push(relative);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn read_file(&self, path: &Path) -> Result<String, ScanError> {
        fs::read_to_string(self.root.join(path))
            .map_err(|e| self.access_error(format!("failed to read {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::locate_lock_files;
    use std::fs;

    #[tokio::test]
    async fn test_finds_lock_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("uv.lock"), "version = 1\n").unwrap();
        fs::create_dir_all(dir.path().join("services/api")).unwrap();
        fs::write(dir.path().join("services/api/uv.lock"), "version = 1\n").unwrap();
        fs::write(dir.path().join("services/api/not-uv.lock"), "").unwrap();

        let repo = LocalRepo::new(dir.path());
        let paths = repo.list_files("uv.lock").await.unwrap();
        assert_eq!(
            paths,
            vec![PathBuf::from("services/api/uv.lock"), PathBuf::from("uv.lock")]
        );
    }

    #[tokio::test]
    async fn test_locate_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("uv.lock"), "version = 1\n").unwrap();

        let repo = LocalRepo::new(dir.path());
        let lock_files = locate_lock_files(&repo, "uv.lock").await.unwrap();
        assert_eq!(lock_files.len(), 1);
        assert_eq!(lock_files[0].content, "version = 1\n");
    }

    #[tokio::test]
    async fn test_missing_root_is_access_error() {
        let repo = LocalRepo::new("/nonexistent/checkout");
        let err = repo.list_files("uv.lock").await.unwrap_err();
        assert!(matches!(err, ScanError::RepoAccess { .. }));
    }

    #[tokio::test]
    async fn test_no_matches_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "# hello\n").unwrap();

        let repo = LocalRepo::new(dir.path());
        let err = locate_lock_files(&repo, "uv.lock").await.unwrap_err();
        assert!(matches!(err, ScanError::NoLockFiles { .. }));
    }
}
