use crate::model::{PackageStatus, ScanReport};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Advisory")]
    advisory: String,
    #[tabled(rename = "Title")]
    title: String,
}

#[derive(Tabled)]
struct IncompleteRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn render_table(report: &ScanReport) -> Result<String> {
    let mut out = String::new();

    writeln!(
        out,
        "\nScan completed at: {}",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "Lock files: {}",
        report
            .lock_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )?;
    let clean = report
        .scanned
        .iter()
        .filter(|p| report.status(&p.purl) == Some(PackageStatus::Clean))
        .count();
    writeln!(
        out,
        "Packages: {} scanned, {} clean, {} vulnerable, {} could not be checked",
        report.scanned.len(),
        clean,
        report.vulnerable_package_count(),
        report.incomplete.len()
    )?;
    if report.skipped_non_registry > 0 {
        writeln!(
            out,
            "Skipped {} entries without a registry identity (git/path/virtual)",
            report.skipped_non_registry
        )?;
    }
    if !report.warnings.is_empty() {
        writeln!(out, "\n{} malformed lock entries were skipped:", report.warnings.len())?;
        for warning in &report.warnings {
            writeln!(out, "  - {}", warning)?;
        }
    }

    if report.findings.is_empty() {
        writeln!(out, "\nNo known vulnerabilities found.")?;
    } else {
        writeln!(out, "\nFound {} vulnerabilities:", report.finding_count())?;
        let mut rows: Vec<FindingRow> = report
            .findings
            .values()
            .flatten()
            .map(|f| FindingRow {
                severity: f.severity.to_string(),
                package: f.purl.clone(),
                advisory: f.advisory_id.clone(),
                title: truncate(&f.title, 60),
            })
            .collect();
        rows.sort_by(|a, b| a.package.cmp(&b.package));
        writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    if !report.incomplete.is_empty() {
        writeln!(
            out,
            "\nWARNING: {} packages could not be checked (not the same as clean):",
            report.incomplete.len()
        )?;
        let rows: Vec<IncompleteRow> = report
            .incomplete
            .iter()
            .map(|purl| IncompleteRow {
                package: purl.clone(),
                status: "scan incomplete".to_string(),
            })
            .collect();
        writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    Ok(out)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalPackage, Severity, VulnerabilityFinding};
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;

    #[test]
    fn test_table_distinguishes_incomplete_from_clean() {
        let vulnerable = "pkg:pypi/requests@2.25.0";
        let mut findings = BTreeMap::new();
        findings.insert(
            vulnerable.to_string(),
            vec![VulnerabilityFinding {
                purl: vulnerable.to_string(),
                advisory_id: "CVE-2023-32681".to_string(),
                title: "Proxy-Authorization header leak".to_string(),
                severity: Severity::Medium,
                cvss_score: Some(6.1),
                references: Vec::new(),
                affected_range: None,
            }],
        );
        let report = ScanReport {
            scanned: [
                CanonicalPackage {
                    purl: vulnerable.to_string(),
                    name: "requests".to_string(),
                    version: "2.25.0".to_string(),
                },
                CanonicalPackage {
                    purl: "pkg:pypi/foo@1.0.0".to_string(),
                    name: "foo".to_string(),
                    version: "1.0.0".to_string(),
                },
            ]
            .into_iter()
            .collect(),
            findings,
            incomplete: ["pkg:pypi/foo@1.0.0".to_string()].into_iter().collect(),
            lock_files: vec![PathBuf::from("uv.lock")],
            warnings: Vec::new(),
            skipped_non_registry: 0,
            timestamp: Utc::now(),
        };

        let table = render_table(&report).unwrap();
        assert!(table.contains("CVE-2023-32681"));
        assert!(table.contains("could not be checked"));
        assert!(table.contains("pkg:pypi/foo@1.0.0"));
        assert!(table.contains("1 vulnerabilities"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long advisory title", 10), "a very ...");
    }
}
