use crate::model::ScanReport;
use anyhow::Result;

pub fn render_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn test_json_round_trips() {
        let report = ScanReport {
            scanned: BTreeSet::new(),
            findings: BTreeMap::new(),
            incomplete: BTreeSet::new(),
            lock_files: Vec::new(),
            warnings: Vec::new(),
            skipped_non_registry: 0,
            timestamp: Utc::now(),
        };
        let json = render_json(&report).unwrap();
        let parsed: ScanReport = serde_json::from_str(&json).unwrap();
        assert!(parsed.scanned.is_empty());
        assert!(parsed.incomplete.is_empty());
    }
}
