use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{file_name_matches, RepoSource};
use crate::config::GithubConfig;
use crate::error::ScanError;

/// Repository source backed by the GitHub REST API.
///
/// Discovery uses the recursive git-trees endpoint; file reads use the
/// contents endpoint with the raw media type. An optional bearer token
/// raises rate limits and grants private-repo access.
pub struct GithubRepo {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    reference: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    sha: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: Option<String>,
}

impl GithubRepo {
    /// Builds a source from a repository URL of the form
    /// `https://github.com/OWNER/REPO[.git][/tree/REF]`. Without a `/tree/`
    /// segment the default branch (`HEAD`) is used.
    pub fn from_url(url: &str, config: &GithubConfig) -> Result<Self, ScanError> {
        let (owner, repo, reference) = parse_repo_url(url)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("lockscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::RepoAccess {
                repo: format!("{owner}/{repo}"),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner,
            repo,
            reference,
            token: config.token.clone(),
        })
    }

    fn get(&self, url: String, raw: bool) -> reqwest::RequestBuilder {
        let accept = if raw {
            "application/vnd.github.raw+json"
        } else {
            "application/vnd.github+json"
        };
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn access_error(&self, reason: impl Into<String>) -> ScanError {
        ScanError::RepoAccess {
            repo: self.describe(),
            reason: reason.into(),
        }
    }

    fn check_status(&self, status: reqwest::StatusCode) -> Result<(), ScanError> {
        if status.is_success() {
            return Ok(());
        }
        let reason = match status.as_u16() {
            404 => "repository, ref, or path not found".to_string(),
            401 => "authorization failed (is the token valid?)".to_string(),
            403 => "access forbidden (private repository or rate limit)".to_string(),
            code => format!("host returned HTTP {code}"),
        };
        Err(self.access_error(reason))
    }

    /// Walks tree objects one level at a time. Fallback for repositories too
    /// large for a single recursive listing.
    async fn walk_truncated_tree(
        &self,
        root_sha: String,
        file_name: &str,
    ) -> Result<Vec<PathBuf>, ScanError> {
        let mut paths = Vec::new();
        let mut queue: Vec<(PathBuf, String)> = vec![(PathBuf::new(), root_sha)];
        let mut seen: HashSet<String> = HashSet::new();

        while let Some((prefix, sha)) = queue.pop() {
            if !seen.insert(sha.clone()) {
                continue;
            }
            let url = format!(
                "{}/repos/{}/{}/git/trees/{}",
                self.api_base, self.owner, self.repo, sha
            );
            let response = self
                .get(url, false)
                .send()
                .await
                .map_err(|e| self.access_error(e.to_string()))?;
            if response.status().as_u16() == 404 {
                continue;
            }
            self.check_status(response.status())?;
            let node: TreeResponse = response
                .json()
                .await
                .map_err(|e| self.access_error(format!("malformed tree response: {e}")))?;

            for entry in node.tree {
                let path = prefix.join(&entry.path);
                match entry.kind.as_str() {
                    "tree" => {
                        if let Some(child) = entry.sha {
                            queue.push((path, child));
                        }
                    }
                    "blob" if file_name_matches(&path, file_name) => paths.push(path),
                    _ => {}
                }
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl RepoSource for GithubRepo {
    fn describe(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.reference)
    }

    async fn list_files(&self, file_name: &str) -> Result<Vec<PathBuf>, ScanError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.reference
        );
        let response = self
            .get(url, false)
            .send()
            .await
            .map_err(|e| self.access_error(e.to_string()))?;
        self.check_status(response.status())?;
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|e| self.access_error(format!("malformed tree response: {e}")))?;

        let mut paths: Vec<PathBuf> = tree
            .tree
            .iter()
            .filter(|e| e.kind == "blob")
            .map(|e| PathBuf::from(&e.path))
            .filter(|p| file_name_matches(p, file_name))
            .collect();

        // A truncated recursive listing can hide matches; fall back to a
        // manual walk of the tree objects.
        if tree.truncated {
            if paths.is_empty() {
                debug!(repo = %self.describe(), "tree listing truncated, walking manually");
                let root = tree.sha.unwrap_or_else(|| self.reference.clone());
                paths = self.walk_truncated_tree(root, file_name).await?;
            } else {
                warn!(
                    repo = %self.describe(),
                    found = paths.len(),
                    "tree listing truncated, lock files beyond the cutoff may be missed"
                );
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn read_file(&self, path: &Path) -> Result<String, ScanError> {
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.display()
        );
        if self.reference != "HEAD" {
            url.push_str(&format!("?ref={}", self.reference));
        }
        let response = self
            .get(url, true)
            .send()
            .await
            .map_err(|e| self.access_error(e.to_string()))?;
        self.check_status(response.status())?;
        response
            .text()
            .await
            .map_err(|e| self.access_error(format!("failed to read {}: {e}", path.display())))
    }
}

/// Parses `https://github.com/OWNER/REPO[.git][/tree/REF]` into
/// `(owner, repo, ref)`. Absent a `/tree/` segment the ref is `HEAD`.
pub fn parse_repo_url(url: &str) -> Result<(String, String, String), ScanError> {
    let invalid = |reason: &str| ScanError::InvalidRepoRef {
        reference: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid("expected an http(s) URL"))?;
    let mut segments = rest.split('/');
    let host = segments.next().unwrap_or_default();
    if host != "github.com" && host != "www.github.com" {
        return Err(invalid("expected a github.com URL"));
    }
    let parts: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
    if parts.len() < 2 {
        return Err(invalid("missing owner/repo path segments"));
    }
    let owner = parts[0].to_string();
    let repo = parts[1].strip_suffix(".git").unwrap_or(parts[1]).to_string();
    let reference = if parts.len() >= 4 && parts[2] == "tree" {
        parts[3].to_string()
    } else {
        "HEAD".to_string()
    };
    Ok((owner, repo, reference))
}
