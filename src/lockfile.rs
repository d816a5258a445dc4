//! Lock-file parsing.
//!
//! The lock format (uv.lock) is a TOML document made of repeated
//! `[[package]]` tables with `name` and `version` string fields and an
//! optional `source` inline table. Parsing is fault-isolated per block: a
//! malformed entry is skipped with a recorded [`ParseWarning`] instead of
//! aborting the file, so one bad block never loses the others.
//!
//! Version strings are kept opaque here; interpreting them is the
//! vulnerability index's concern.

use serde::Deserialize;
use std::path::Path;

use crate::error::ParseWarning;
use crate::model::{Ecosystem, PackageOrigin, PackageRecord};

/// Result of parsing one lock file.
#[derive(Debug, Default)]
pub struct ParsedLockFile {
    pub records: Vec<PackageRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// Raw shape of one `[[package]]` entry. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: String,
    version: Option<String>,
    source: Option<SourceEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SourceEntry {
    registry: Option<String>,
    git: Option<String>,
    rev: Option<String>,
    path: Option<String>,
    directory: Option<String>,
    editable: Option<String>,
    #[serde(rename = "virtual")]
    virtual_: Option<String>,
}

impl SourceEntry {
    fn origin(self) -> PackageOrigin {
        if self.git.is_some() {
            PackageOrigin::Git {
                url: self.git,
                rev: self.rev,
            }
        } else if self.path.is_some() || self.directory.is_some() || self.editable.is_some() {
            PackageOrigin::Local
        } else if self.virtual_.is_some() {
            PackageOrigin::Virtual
        } else {
            PackageOrigin::Registry { url: self.registry }
        }
    }
}

/// Parses one lock file's text into package records.
///
/// Never fails: a structurally broken document falls back to block-by-block
/// parsing, and individual bad entries become warnings. A file with zero
/// parseable package blocks yields an empty record list, not an error.
pub fn parse_lock_file(path: &Path, text: &str) -> ParsedLockFile {
    match toml::from_str::<toml::Value>(text) {
        Ok(doc) => parse_document(path, doc),
        // Whole-document parse failed (one corrupt block poisons a TOML
        // document); recover the intact blocks individually.
        Err(_) => parse_blockwise(path, text),
    }
}

fn parse_document(path: &Path, doc: toml::Value) -> ParsedLockFile {
    let mut parsed = ParsedLockFile::default();
    let Some(entries) = doc.get("package").and_then(|v| v.as_array()) else {
        return parsed;
    };
    for (i, value) in entries.iter().enumerate() {
        match value.clone().try_into::<PackageEntry>() {
            Ok(entry) => convert_entry(path, i + 1, entry, &mut parsed),
            Err(e) => parsed.warnings.push(ParseWarning {
                file: path.to_path_buf(),
                block: i + 1,
                reason: e.to_string(),
            }),
        }
    }
    parsed
}

/// Splits the text on `[[package]]` headers and parses each block as its own
/// document. Content before the first header (lockfile preamble) is ignored.
fn parse_blockwise(path: &Path, text: &str) -> ParsedLockFile {
    #[derive(Deserialize)]
    struct BlockDoc {
        #[serde(default)]
        package: Vec<PackageEntry>,
    }

    let mut parsed = ParsedLockFile::default();
    let mut blocks: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.trim() == "[[package]]" {
            blocks.push(String::new());
        }
        if let Some(current) = blocks.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }

    for (i, block) in blocks.iter().enumerate() {
        match toml::from_str::<BlockDoc>(block) {
            Ok(doc) => {
                for entry in doc.package {
                    convert_entry(path, i + 1, entry, &mut parsed);
                }
            }
            Err(e) => parsed.warnings.push(ParseWarning {
                file: path.to_path_buf(),
                block: i + 1,
                reason: e.to_string(),
            }),
        }
    }
    parsed
}

fn convert_entry(path: &Path, block: usize, entry: PackageEntry, out: &mut ParsedLockFile) {
    let Some(version) = entry.version else {
        out.warnings.push(ParseWarning {
            file: path.to_path_buf(),
            block,
            reason: format!("package `{}` has no `version`", entry.name),
        });
        return;
    };
    let origin = entry.source.unwrap_or_default().origin();
    out.records.push(PackageRecord::new(
        entry.name,
        version,
        Ecosystem::Pypi,
        origin,
        path,
    ));
}
