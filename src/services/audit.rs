//! Ledger consistency checks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::ledger::Ledger;
use crate::models::DocumentRecord;
use crate::utils::hash_file;

/// A checksum claimed by more than one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateChecksum {
    pub checksum: String,
    pub documents: Vec<String>,
}

/// A row whose file on disk hashes differently from its recorded checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    pub document: String,
    pub path: PathBuf,
    pub recorded: String,
    pub actual: String,
}

/// Findings for one ledger.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub total: usize,
    pub status_counts: BTreeMap<&'static str, usize>,
    /// Same content under different ids; reported, not a violation.
    pub duplicate_checksums: Vec<DuplicateChecksum>,
    pub missing_checksum: Vec<String>,
    pub missing_file: Vec<(String, Option<PathBuf>)>,
    pub hash_mismatches: Vec<HashMismatch>,
    /// Files that could not be read during verification.
    pub unreadable: Vec<(String, PathBuf)>,
    pub verified: usize,
}

impl AuditReport {
    /// Number of integrity violations.
    pub fn violations(&self) -> usize {
        self.missing_checksum.len()
            + self.missing_file.len()
            + self.hash_mismatches.len()
            + self.unreadable.len()
    }

    pub fn is_clean(&self) -> bool {
        self.violations() == 0
    }
}

fn label(record: &DocumentRecord) -> String {
    record
        .document_id
        .clone()
        .or_else(|| record.filename_key().map(str::to_string))
        .unwrap_or_else(|| "<unnamed row>".to_string())
}

/// Check every ledger row. Relative paths resolve against `download_dir`.
pub fn audit_ledger(ledger: &Ledger, download_dir: &Path, verify: bool) -> AuditReport {
    let mut report = AuditReport::default();
    let mut by_checksum: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

    for record in ledger.records() {
        report.total += 1;
        *report.status_counts.entry(record.status.as_str()).or_insert(0) += 1;

        let name = label(record);
        if let Some(checksum) = record.checksum.as_deref() {
            by_checksum.entry(checksum).or_default().insert(name.clone());
        }

        if !record.status.requires_file() {
            continue;
        }

        let Some(checksum) = record.checksum.as_deref() else {
            report.missing_checksum.push(name);
            continue;
        };

        let path = record.local_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                download_dir.join(p)
            }
        });
        let Some(path) = path.filter(|p| p.exists()) else {
            report
                .missing_file
                .push((name, record.local_path.clone()));
            continue;
        };

        if verify {
            match hash_file(&path) {
                Ok(actual) if actual == checksum => report.verified += 1,
                Ok(actual) => report.hash_mismatches.push(HashMismatch {
                    document: name,
                    path,
                    recorded: checksum.to_string(),
                    actual,
                }),
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", path.display(), e);
                    report.unreadable.push((name, path));
                }
            }
        }
    }

    report.duplicate_checksums = by_checksum
        .into_iter()
        .filter(|(_, docs)| docs.len() > 1)
        .map(|(checksum, docs)| DuplicateChecksum {
            checksum: checksum.to_string(),
            documents: docs.into_iter().collect(),
        })
        .collect();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DownloadStatus;
    use crate::utils::compute_hash;
    use tempfile::tempdir;

    fn downloaded(id: &str, path: PathBuf, checksum: &str) -> DocumentRecord {
        let mut r = DocumentRecord::new(id);
        r.local_path = Some(path);
        r.checksum = Some(checksum.to_string());
        r.status = DownloadStatus::Downloaded;
        r
    }

    #[test]
    fn test_clean_ledger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a_D1.pdf");
        std::fs::write(&path, b"one").unwrap();

        let mut ledger = Ledger::new(dir.path().join("ledger.csv"));
        ledger.upsert(downloaded("D1", path, &compute_hash(b"one")));
        let mut failed = DocumentRecord::new("D2");
        failed.status = DownloadStatus::Failed;
        ledger.upsert(failed);

        let report = audit_ledger(&ledger, dir.path(), true);
        assert!(report.is_clean());
        assert_eq!(report.verified, 1);
        assert_eq!(report.status_counts.get("failed"), Some(&1));
    }

    #[test]
    fn test_reports_violations_and_duplicates() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"changed").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"same").unwrap();

        let same = compute_hash(b"same");
        let mut ledger = Ledger::new(dir.path().join("ledger.csv"));
        ledger.upsert(downloaded("D1", PathBuf::from("a.pdf"), &compute_hash(b"original")));
        ledger.upsert(downloaded("D2", PathBuf::from("b.pdf"), &same));
        ledger.upsert(downloaded("D3", PathBuf::from("b.pdf"), &same));
        ledger.upsert(downloaded("D4", PathBuf::from("gone.pdf"), &same));
        let mut no_sum = DocumentRecord::new("D5");
        no_sum.status = DownloadStatus::SkippedMatching;
        ledger.upsert(no_sum);

        let report = audit_ledger(&ledger, dir.path(), true);
        assert_eq!(report.hash_mismatches.len(), 1);
        assert_eq!(report.hash_mismatches[0].document, "D1");
        assert_eq!(report.missing_file.len(), 1);
        assert_eq!(report.missing_checksum, vec!["D5".to_string()]);
        assert_eq!(report.duplicate_checksums.len(), 1);
        assert_eq!(report.duplicate_checksums[0].documents, vec!["D2", "D3", "D4"]);
        assert_eq!(report.violations(), 3);
    }

    #[test]
    fn test_without_verify_skips_rehash() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"changed").unwrap();
        let mut ledger = Ledger::new(dir.path().join("ledger.csv"));
        ledger.upsert(downloaded("D1", PathBuf::from("a.pdf"), "deadbeef"));

        let report = audit_ledger(&ledger, dir.path(), false);
        assert!(report.is_clean());
        assert_eq!(report.verified, 0);
    }
}
