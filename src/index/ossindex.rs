use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{IndexEntry, IndexTransport};
use crate::config::IndexConfig;
use crate::error::{IndexError, ScanError};
use crate::model::{Severity, VulnerabilityFinding};

/// Transport for the Sonatype OSS Index v3 component-report endpoint.
///
/// One call posts up to the configured batch limit of purl coordinates and
/// gets back a report per coordinate. Basic auth (account email + API
/// token) is optional and raises rate limits.
pub struct OssIndexTransport {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
}

#[derive(Serialize)]
struct ComponentReportRequest {
    coordinates: Vec<String>,
}

#[derive(Deserialize)]
struct ComponentReport {
    coordinates: String,
    #[serde(default)]
    vulnerabilities: Vec<OssIndexVuln>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OssIndexVuln {
    id: String,
    display_name: Option<String>,
    title: Option<String>,
    cvss_score: Option<f64>,
    cvss_vector: Option<String>,
    cve: Option<String>,
    reference: Option<String>,
    #[serde(default)]
    external_references: Vec<String>,
    #[serde(default)]
    version_ranges: Vec<String>,
}

impl OssIndexTransport {
    pub fn new(config: &IndexConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lockscan/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| ScanError::IndexAccess {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let auth = match (&config.auth_email, &config.auth_token) {
            (Some(email), Some(token)) => Some((email.clone(), token.clone())),
            _ => None,
        };
        Ok(Self {
            client,
            url: format!(
                "{}/api/v3/component-report",
                config.base_url.trim_end_matches('/')
            ),
            auth,
        })
    }
}

#[async_trait]
impl IndexTransport for OssIndexTransport {
    fn name(&self) -> &'static str {
        "OSS Index"
    }

    async fn query_batch(&self, purls: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        let body = ComponentReportRequest {
            coordinates: purls.to_vec(),
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some((email, token)) = &self.auth {
            request = request.basic_auth(email, Some(token));
        }

        let response = request.send().await.map_err(|e| IndexError::Transient {
            reason: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            },
            retry_after: None,
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(IndexError::Transient {
                reason: "rate limited".to_string(),
                retry_after: retry_after_delay(response.headers()),
            });
        }
        if status.is_server_error() {
            return Err(IndexError::Transient {
                reason: format!("index returned HTTP {}", status.as_u16()),
                retry_after: None,
            });
        }
        if !status.is_success() {
            return Err(IndexError::Permanent {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let reports: Vec<ComponentReport> =
            response.json().await.map_err(|e| IndexError::Transient {
                reason: format!("malformed response body: {e}"),
                retry_after: None,
            })?;

        Ok(reports
            .into_iter()
            .map(into_entry)
            .filter(|entry| !entry.findings.is_empty())
            .collect())
    }
}

fn into_entry(report: ComponentReport) -> IndexEntry {
    let purl = report.coordinates;
    let findings = report
        .vulnerabilities
        .into_iter()
        .map(|vuln| into_finding(&purl, vuln))
        .collect();
    IndexEntry { purl, findings }
}

fn into_finding(purl: &str, vuln: OssIndexVuln) -> VulnerabilityFinding {
    let severity = severity_from_cvss(vuln.cvss_score, vuln.cvss_vector.as_deref());
    let advisory_id = vuln.cve.or(vuln.display_name).unwrap_or_else(|| vuln.id.clone());
    let mut references: Vec<String> = vuln.reference.into_iter().collect();
    references.extend(vuln.external_references);
    VulnerabilityFinding {
        purl: purl.to_string(),
        advisory_id,
        title: vuln
            .title
            .unwrap_or_else(|| "Unknown vulnerability".to_string()),
        severity,
        cvss_score: vuln.cvss_score,
        references,
        affected_range: if vuln.version_ranges.is_empty() {
            None
        } else {
            Some(vuln.version_ranges.join(", "))
        },
    }
}

/// Maps a CVSS score (or, failing that, a vector string's impact metrics)
/// to a severity level.
pub fn severity_from_cvss(score: Option<f64>, vector: Option<&str>) -> Severity {
    if let Some(score) = score {
        return match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        };
    }

    if let Some(vector) = vector.filter(|v| v.contains("CVSS:")) {
        // Simplified read of the impact metrics from a vector like
        // "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
        if vector.contains("/C:H") || vector.contains("/I:H") || vector.contains("/A:H") {
            return Severity::High;
        }
        if vector.contains("/C:L") || vector.contains("/I:L") || vector.contains("/A:L") {
            return Severity::Medium;
        }
        return Severity::Low;
    }

    Severity::Unknown
}

fn retry_after_delay(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let seconds: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}
