//! End-to-end pipeline tests against a local checkout and a scripted index
//! transport. No network involved.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lockscan::config::ScanConfig;
use lockscan::error::{IndexError, ScanError};
use lockscan::index::{IndexEntry, IndexTransport};
use lockscan::model::{PackageStatus, Severity, VulnerabilityFinding};
use lockscan::pipeline::Pipeline;
use lockscan::repo::LocalRepo;

/// Answers batch queries from a fixed purl -> findings table. Purls without
/// an entry are omitted from responses, i.e. "no known vulnerabilities".
struct TableTransport {
    known: HashMap<String, Vec<VulnerabilityFinding>>,
}

#[async_trait]
impl IndexTransport for TableTransport {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn query_batch(&self, purls: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        Ok(purls
            .iter()
            .filter_map(|purl| {
                self.known.get(purl).map(|findings| IndexEntry {
                    purl: purl.clone(),
                    findings: findings.clone(),
                })
            })
            .collect())
    }
}

/// Every request times out.
struct TimeoutTransport;

#[async_trait]
impl IndexTransport for TimeoutTransport {
    fn name(&self) -> &'static str {
        "timeout"
    }

    async fn query_batch(&self, _purls: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        Err(IndexError::Transient {
            reason: "request timed out".to_string(),
            retry_after: None,
        })
    }
}

fn finding(purl: &str, advisory: &str, severity: Severity) -> VulnerabilityFinding {
    VulnerabilityFinding {
        purl: purl.to_string(),
        advisory_id: advisory.to_string(),
        title: format!("{advisory} affects this version"),
        severity,
        cvss_score: Some(6.1),
        references: vec![format!("https://nvd.nist.gov/vuln/detail/{advisory}")],
        affected_range: None,
    }
}

fn write_lock(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn fast_config() -> ScanConfig {
    let mut config = ScanConfig::default();
    config.index.max_retries = 2;
    config.index.retry_backoff_ms = 1;
    config
}

fn pipeline(dir: &Path, transport: Arc<dyn IndexTransport>) -> Pipeline {
    Pipeline::new(
        Box::new(LocalRepo::new(dir)),
        transport,
        fast_config(),
    )
}

const REQUESTS_LOCK: &str = r#"
version = 1

[[package]]
name = "requests"
version = "2.25.0"
source = { registry = "https://pypi.org/simple" }
"#;

#[tokio::test]
async fn scan_reports_known_vulnerability() {
    // scenario: one pinned package with one known CVE
    let dir = tempfile::tempdir().unwrap();
    write_lock(dir.path(), "uv.lock", REQUESTS_LOCK);

    let purl = "pkg:pypi/requests@2.25.0";
    let transport = Arc::new(TableTransport {
        known: HashMap::from([(
            purl.to_string(),
            vec![finding(purl, "CVE-2023-32681", Severity::Medium)],
        )]),
    });

    let report = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scanned.len(), 1);
    assert_eq!(report.status(purl), Some(PackageStatus::Vulnerable));
    let findings = &report.findings[purl];
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].advisory_id, "CVE-2023-32681");
    assert_eq!(findings[0].severity, Severity::Medium);
    assert!(report.incomplete.is_empty());
}

#[tokio::test]
async fn empty_lock_file_is_an_empty_report_not_an_error() {
    // the file exists, so "no lock files" must not be raised
    let dir = tempfile::tempdir().unwrap();
    write_lock(dir.path(), "uv.lock", "version = 1\n");

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let report = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.scanned.is_empty());
    assert!(report.findings.is_empty());
    assert!(report.incomplete.is_empty());
    assert_eq!(report.lock_files.len(), 1);
}

#[tokio::test]
async fn missing_lock_file_is_no_lock_files_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README.md"), "# demo\n").unwrap();

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let err = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::NoLockFiles { .. }));
}

#[tokio::test]
async fn exhausted_retries_reports_incomplete_never_clean() {
    // scenario: the index times out on every attempt
    let dir = tempfile::tempdir().unwrap();
    write_lock(
        dir.path(),
        "uv.lock",
        r#"
[[package]]
name = "foo"
version = "1.0.0"
source = { registry = "https://pypi.org/simple" }
"#,
    );

    let report = pipeline(dir.path(), Arc::new(TimeoutTransport))
        .run(CancellationToken::new())
        .await
        .unwrap();

    let purl = "pkg:pypi/foo@1.0.0";
    assert_eq!(report.status(purl), Some(PackageStatus::Incomplete));
    assert!(report.incomplete.contains(purl));
    assert!(!report.findings.contains_key(purl));
}

#[tokio::test]
async fn monorepo_lock_files_are_merged_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    write_lock(dir.path(), "uv.lock", REQUESTS_LOCK);
    // same package same version in a nested manifest, plus one more at a
    // different pinned version: the first collapses, the second stays
    write_lock(
        dir.path(),
        "services/api/uv.lock",
        r#"
[[package]]
name = "Requests"
version = "2.25.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "requests"
version = "2.31.0"
source = { registry = "https://pypi.org/simple" }
"#,
    );

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let report = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.lock_files.len(), 2);
    assert_eq!(report.scanned.len(), 2);
    assert_eq!(
        report.status("pkg:pypi/requests@2.25.0"),
        Some(PackageStatus::Clean)
    );
    assert_eq!(
        report.status("pkg:pypi/requests@2.31.0"),
        Some(PackageStatus::Clean)
    );
}

#[tokio::test]
async fn malformed_entries_are_recorded_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_lock(
        dir.path(),
        "uv.lock",
        r#"
[[package]]
name = "good"
version = "1.0.0"

[[package]]
name = "broken
version = "2.0.0"
"#,
    );

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let report = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scanned.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(
        report.status("pkg:pypi/good@1.0.0"),
        Some(PackageStatus::Clean)
    );
}

#[tokio::test]
async fn non_registry_entries_are_counted_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_lock(
        dir.path(),
        "uv.lock",
        r#"
[[package]]
name = "pinned"
version = "1.0.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "from-git"
version = "0.3.0"
source = { git = "https://github.com/example/from-git", rev = "abc123" }

[[package]]
name = "workspace-app"
version = "0.1.0"
source = { editable = "." }
"#,
    );

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let report = pipeline(dir.path(), transport)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scanned.len(), 1);
    assert_eq!(report.skipped_non_registry, 2);
}

#[tokio::test]
async fn cancelled_scan_reports_packages_as_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    write_lock(dir.path(), "uv.lock", REQUESTS_LOCK);

    let transport = Arc::new(TableTransport {
        known: HashMap::new(),
    });
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline(dir.path(), transport)
        .run(cancel)
        .await
        .unwrap();

    assert_eq!(
        report.status("pkg:pypi/requests@2.25.0"),
        Some(PackageStatus::Incomplete)
    );
}
