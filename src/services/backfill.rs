//! Rebuild or repair the ledger from files already on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::LedgerError;
use crate::ledger::{CsvTable, Ledger};
use crate::models::{DocumentRecord, DownloadStatus};
use crate::naming::infer_document_id;
use crate::utils::hash_file;

/// Counts for a finished backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// PDF files scanned.
    pub scanned: usize,
    /// Files whose name carried a document id.
    pub inferred: usize,
    /// Files with no inferable id.
    pub unknown: usize,
    /// Files that could not be read.
    pub failed: usize,
    /// Rows written to the ledger.
    pub rows_written: usize,
}

/// Best-effort lookup into an enrichment CSV. The first row for a key wins.
struct Enrichment<'a> {
    by_id: HashMap<&'a str, &'a DocumentRecord>,
    by_filename: HashMap<&'a str, &'a DocumentRecord>,
}

impl<'a> Enrichment<'a> {
    fn new(table: Option<&'a CsvTable>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_filename = HashMap::new();
        for row in table.into_iter().flat_map(|t| t.rows.iter()) {
            if let Some(id) = row.document_id.as_deref() {
                by_id.entry(id).or_insert(row);
            }
            if let Some(name) = row.generated_filename.as_deref() {
                by_filename.entry(name).or_insert(row);
            }
        }
        Self { by_id, by_filename }
    }

    fn find(&self, document_id: Option<&str>, filename: &str) -> Option<&'a DocumentRecord> {
        document_id
            .and_then(|id| self.by_id.get(id).copied())
            .or_else(|| self.by_filename.get(filename).copied())
    }
}

/// Scans a download directory and merges what it finds into the ledger.
pub struct BackfillService {
    pdf_dir: PathBuf,
}

impl BackfillService {
    pub fn new(pdf_dir: impl Into<PathBuf>) -> Self {
        Self {
            pdf_dir: pdf_dir.into(),
        }
    }

    /// Scan, merge and save.
    ///
    /// Scan results (checksum, path, filename, timestamp, status) always win;
    /// enrichment rows fill gaps next, then prior ledger rows. Prior rows for
    /// files that are no longer on disk are kept as they were.
    pub fn run(
        &self,
        ledger: &mut Ledger,
        enrichment: Option<&CsvTable>,
    ) -> Result<BackfillSummary, LedgerError> {
        let mut summary = BackfillSummary::default();
        let enrichment_index = Enrichment::new(enrichment);
        if let Some(table) = enrichment {
            ledger.merge_columns(table.header.iter().map(String::as_str));
        }

        for (filename, path) in list_pdfs(&self.pdf_dir)? {
            summary.scanned += 1;

            let checksum = match hash_file(&path) {
                Ok(sum) => sum,
                Err(e) => {
                    tracing::warn!("Could not hash {}: {}", path.display(), e);
                    summary.failed += 1;
                    continue;
                }
            };

            let inferred = infer_document_id(&filename);
            if inferred.is_some() {
                summary.inferred += 1;
            } else {
                summary.unknown += 1;
            }

            let prior = inferred
                .as_deref()
                .and_then(|id| ledger.get_by_id(id))
                .or_else(|| ledger.find_by_filename(&filename))
                .cloned();
            let source = enrichment_index.find(inferred.as_deref(), &filename);

            let mut record = DocumentRecord {
                document_id: inferred.clone(),
                downloaded_filename: Some(filename.clone()),
                local_path: Some(path.clone()),
                checksum: Some(checksum),
                status: DownloadStatus::Backfilled,
                fetched_at: Some(Utc::now()),
                id_match_checked: Some(inferred.is_some()),
                ..Default::default()
            };
            if let Some(source) = source {
                record.fill_gaps(source);
            }
            if let Some(prior) = &prior {
                record.fill_gaps(prior);
            }
            if record.generated_filename.is_none() {
                record.generated_filename = Some(filename.clone());
            }

            tracing::debug!(
                "Backfilled {} as {}",
                filename,
                record.document_id.as_deref().unwrap_or("<no id>")
            );
            ledger.upsert(record);
        }

        summary.rows_written = ledger.len();
        ledger.save()?;
        Ok(summary)
    }
}

/// Regular files ending in `.pdf` (any case), sorted by name.
fn list_pdfs(dir: &Path) -> Result<Vec<(String, PathBuf)>, LedgerError> {
    let entries = fs::read_dir(dir).map_err(|e| LedgerError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LedgerError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_lowercase().ends_with(".pdf") {
            files.push((name, path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns;
    use crate::utils::compute_hash;
    use tempfile::tempdir;

    const ID1: &str = "069cs0000104BR0AAM";
    const ID2: &str = "0698z0000061FxYAAU";
    const ID3: &str = "0698z000005Hpu5AAC";

    #[test]
    fn test_backfill_scans_infers_and_preserves() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(format!("agency_{}.pdf", ID1)), b"one").unwrap();
        fs::write(dir.path().join("scan without id.PDF"), b"loose").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let ledger_path = dir.path().join("ledger.csv");
        let mut ledger = Ledger::new(&ledger_path);
        let mut prior = DocumentRecord::new(ID1);
        prior.agency_id = Some("A1".to_string());
        prior.title = Some("Prior Title".to_string());
        prior.checksum = Some("stale".to_string());
        ledger.upsert(prior);
        let mut gone = DocumentRecord::new(ID3);
        gone.status = DownloadStatus::Downloaded;
        gone.checksum = Some("cafe".to_string());
        ledger.upsert(gone.clone());

        let summary = BackfillService::new(dir.path()).run(&mut ledger, None).unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.inferred, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.rows_written, 3);

        let saved = Ledger::load(&ledger_path).unwrap();
        let one = saved.get_by_id(ID1).unwrap();
        assert_eq!(one.checksum.as_deref(), Some(compute_hash(b"one").as_str()));
        assert_eq!(one.title.as_deref(), Some("Prior Title"));
        assert_eq!(one.status, DownloadStatus::Backfilled);
        assert_eq!(one.id_match_checked, Some(true));

        let kept = saved.get_by_id(ID3).unwrap();
        assert_eq!(kept.checksum.as_deref(), Some("cafe"));
        assert_eq!(kept.status, DownloadStatus::Downloaded);

        let loose = saved.find_by_filename("scan without id.PDF").unwrap();
        assert!(loose.document_id.is_none());
        assert_eq!(loose.id_match_checked, Some(false));
    }

    #[test]
    fn test_enrichment_outranks_prior_ledger() {
        let dir = tempdir().unwrap();
        let name = format!("agency_report_2025-01-02_{}.pdf", ID2);
        fs::write(dir.path().join(&name), b"two").unwrap();

        let mut ledger = Ledger::new(dir.path().join("ledger.csv"));
        let mut prior = DocumentRecord::new(ID2);
        prior.title = Some("Old".to_string());
        prior.agency_name = Some("Prior Agency".to_string());
        ledger.upsert(prior);

        let enrichment = CsvTable {
            header: vec!["ContentDocumentId".to_string(), "Title".to_string()],
            rows: vec![DocumentRecord::from_fields([
                (columns::DOCUMENT_ID, ID2),
                (columns::TITLE, "Enriched"),
            ])],
        };

        BackfillService::new(dir.path())
            .run(&mut ledger, Some(&enrichment))
            .unwrap();

        let record = ledger.get_by_id(ID2).unwrap();
        assert_eq!(record.title.as_deref(), Some("Enriched"));
        assert_eq!(record.agency_name.as_deref(), Some("Prior Agency"));
        assert_eq!(record.generated_filename.as_deref(), Some(name.as_str()));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let mut ledger = Ledger::new(dir.path().join("ledger.csv"));
        let result = BackfillService::new(dir.path().join("absent")).run(&mut ledger, None);
        assert!(matches!(result, Err(LedgerError::Io { .. })));
    }
}
