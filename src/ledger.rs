//! The download ledger: a CSV file mapping document ids to local files.
//!
//! The whole file is read into memory, merged in place, and written back by
//! replacing the target with a fully written temp file in the same directory.
//! Rows that have no document id are kept in a separate unkeyed group and are
//! matched by filename only.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;

use crate::error::{ConfigurationError, LedgerError};
use crate::models::{columns, DocumentRecord, LEDGER_EXTRA_COLUMNS};

/// Listing fields stored as typed record fields rather than in `extra`.
const TYPED_LISTING_COLUMNS: [&str; 5] = [
    columns::AGENCY_NAME,
    columns::AGENCY_ID,
    columns::TITLE,
    columns::CREATED_DATE,
    columns::FILE_EXTENSION,
];

/// How a ledger entry was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    /// Matched on document id.
    Id,
    /// Matched on generated or downloaded filename.
    Filename,
}

/// A CSV file read into records, with its header kept in file order.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<DocumentRecord>,
}

impl CsvTable {
    /// Read a CSV file. Values are trimmed; blank values are treated as absent.
    pub fn read(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| LedgerError::io(path, e))?;
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| LedgerError::csv(path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| LedgerError::csv(path, e))?;
            rows.push(DocumentRecord::from_fields(
                header.iter().map(String::as_str).zip(row.iter()),
            ));
        }

        Ok(Self { header, rows })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|h| h == column)
    }

    /// Fail with a configuration error if `column` is absent from the header.
    pub fn require_column(&self, path: &Path, column: &str) -> Result<(), ConfigurationError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(ConfigurationError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
        }
    }
}

/// Write rows to `path` with every field quoted, replacing the file atomically.
pub fn write_csv_atomic<I>(path: &Path, header: &[String], rows: I) -> Result<(), LedgerError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| LedgerError::io(&dir, e))?;

    let tmp = NamedTempFile::new_in(&dir).map_err(|e| LedgerError::io(&dir, e))?;
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(tmp.as_file());
        writer
            .write_record(header)
            .map_err(|e| LedgerError::csv(path, e))?;
        for row in rows {
            writer
                .write_record(&row)
                .map_err(|e| LedgerError::csv(path, e))?;
        }
        writer
            .flush()
            .map_err(|e| LedgerError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| LedgerError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| LedgerError::io(path, e.error))?;
    Ok(())
}

/// Write raw bytes to `path` atomically.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory ledger bound to a file path.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    header: Vec<String>,
    keyed: BTreeMap<String, DocumentRecord>,
    unkeyed: Vec<DocumentRecord>,
    /// filename -> document id. Entries may be stale; lookups re-check.
    by_filename: HashMap<String, String>,
}

impl Ledger {
    /// An empty ledger that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: Vec::new(),
            keyed: BTreeMap::new(),
            unkeyed: Vec::new(),
            by_filename: HashMap::new(),
        }
    }

    /// Load a ledger; a missing file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut ledger = Self::new(&path);
        if !path.exists() {
            tracing::debug!("No ledger at {}, starting empty", path.display());
            return Ok(ledger);
        }

        let table = CsvTable::read(&path)?;
        ledger.merge_columns(table.header.iter().map(String::as_str));
        for record in table.rows {
            ledger.upsert(record);
        }
        tracing::debug!(
            "Loaded {} ledger rows ({} unkeyed) from {}",
            ledger.len(),
            ledger.unkeyed.len(),
            path.display()
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.keyed.len() + self.unkeyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add columns to the header, keeping first-seen order.
    pub fn merge_columns<'a, I>(&mut self, columns: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for column in columns {
            if !column.is_empty() && !self.header.iter().any(|h| h == column) {
                self.header.push(column.to_string());
            }
        }
    }

    /// Output header: known columns, then listing columns any record carries,
    /// then the fixed ledger columns, then extra columns that only appear on
    /// individual records.
    pub fn columns(&self) -> Vec<String> {
        fn push(columns: &mut Vec<String>, name: &str) {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }

        let mut columns = self.header.clone();
        let records: Vec<&DocumentRecord> =
            self.keyed.values().chain(self.unkeyed.iter()).collect();
        for name in TYPED_LISTING_COLUMNS {
            if records.iter().any(|r| r.get(name).is_some()) {
                push(&mut columns, name);
            }
        }
        for fixed in LEDGER_EXTRA_COLUMNS {
            push(&mut columns, fixed);
        }
        for record in &records {
            for key in record.extra.keys() {
                push(&mut columns, key);
            }
        }
        columns
    }

    pub fn get_by_id(&self, document_id: &str) -> Option<&DocumentRecord> {
        self.keyed.get(document_id)
    }

    /// Find a record whose generated or downloaded filename is `filename`.
    pub fn find_by_filename(&self, filename: &str) -> Option<&DocumentRecord> {
        let matches = |r: &DocumentRecord| {
            r.generated_filename.as_deref() == Some(filename)
                || r.downloaded_filename.as_deref() == Some(filename)
        };

        if let Some(record) = self
            .by_filename
            .get(filename)
            .and_then(|id| self.keyed.get(id))
            .filter(|r| matches(r))
        {
            return Some(record);
        }
        self.unkeyed.iter().find(|r| matches(r))
    }

    /// Look up by id first, then by filename.
    pub fn lookup(
        &self,
        document_id: &str,
        filename: Option<&str>,
    ) -> Option<(&DocumentRecord, LookupKey)> {
        if let Some(record) = self.get_by_id(document_id) {
            return Some((record, LookupKey::Id));
        }
        filename
            .and_then(|f| self.find_by_filename(f))
            .map(|r| (r, LookupKey::Filename))
    }

    /// Insert or replace a record.
    ///
    /// A keyed record replaces the entry with the same id and absorbs any
    /// unkeyed row with the same filename. An unkeyed record replaces the
    /// unkeyed row with the same filename, if any.
    pub fn upsert(&mut self, record: DocumentRecord) {
        let filenames: Vec<String> = [
            record.generated_filename.clone(),
            record.downloaded_filename.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let same_file = |r: &DocumentRecord| {
            filenames.iter().any(|f| {
                r.generated_filename.as_deref() == Some(f.as_str())
                    || r.downloaded_filename.as_deref() == Some(f.as_str())
            })
        };

        match record.document_id.clone() {
            Some(id) => {
                self.unkeyed.retain(|r| !same_file(r));
                for filename in filenames {
                    self.by_filename.insert(filename, id.clone());
                }
                self.keyed.insert(id, record);
            }
            None => {
                if filenames.is_empty() {
                    self.unkeyed.push(record);
                } else if let Some(slot) = self.unkeyed.iter_mut().find(|r| same_file(r)) {
                    *slot = record;
                } else {
                    self.unkeyed.push(record);
                }
            }
        }
    }

    /// All records in output order: keyed rows by
    /// `(agency_id, document_id, generated_filename)`, then unkeyed rows by filename.
    pub fn records(&self) -> Vec<&DocumentRecord> {
        let mut keyed: Vec<&DocumentRecord> = self.keyed.values().collect();
        keyed.sort_by(|a, b| {
            (
                a.agency_id.as_deref().unwrap_or_default(),
                a.document_id.as_deref().unwrap_or_default(),
                a.generated_filename.as_deref().unwrap_or_default(),
            )
                .cmp(&(
                    b.agency_id.as_deref().unwrap_or_default(),
                    b.document_id.as_deref().unwrap_or_default(),
                    b.generated_filename.as_deref().unwrap_or_default(),
                ))
        });

        let mut unkeyed: Vec<&DocumentRecord> = self.unkeyed.iter().collect();
        unkeyed.sort_by(|a, b| {
            a.filename_key()
                .unwrap_or_default()
                .cmp(b.filename_key().unwrap_or_default())
        });

        keyed.extend(unkeyed);
        keyed
    }

    /// Write the ledger to its path, replacing the file atomically.
    pub fn save(&self) -> Result<(), LedgerError> {
        let columns = self.columns();
        let rows: Vec<Vec<String>> = self
            .records()
            .into_iter()
            .map(|r| r.to_row(&columns))
            .collect();
        write_csv_atomic(&self.path, &columns, rows)?;
        tracing::info!("Wrote {} ledger rows to {}", self.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DownloadStatus;
    use tempfile::tempdir;

    fn record(id: Option<&str>, agency: &str, filename: &str) -> DocumentRecord {
        let mut r = DocumentRecord::default();
        if let Some(id) = id {
            r.set(columns::DOCUMENT_ID, id);
        }
        r.set(columns::AGENCY_ID, agency);
        r.set(columns::GENERATED_FILENAME, filename);
        r
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("nope.csv")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_and_reload_keeps_extra_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.csv");

        let mut ledger = Ledger::new(&path);
        ledger.merge_columns(["agency_name", "agency_id", "Id", "ContentDocumentId"]);
        let mut r = record(Some("D1"), "A1", "a_D1.pdf");
        r.set("Id", "068xx");
        r.set("Unusual Column", "kept");
        r.status = DownloadStatus::Downloaded;
        r.checksum = Some("ab".repeat(32));
        ledger.upsert(r);
        ledger.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first_line = text.lines().next().unwrap();
        assert!(first_line.starts_with("\"agency_name\",\"agency_id\",\"Id\",\"ContentDocumentId\""));
        assert!(first_line.contains("\"Unusual Column\""));

        let reloaded = Ledger::load(&path).unwrap();
        let back = reloaded.get_by_id("D1").unwrap();
        assert_eq!(back.extra.get("Id").map(String::as_str), Some("068xx"));
        assert_eq!(back.extra.get("Unusual Column").map(String::as_str), Some("kept"));
        assert_eq!(back.status, DownloadStatus::Downloaded);
    }

    #[test]
    fn test_save_writes_listing_fields_without_prior_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.csv");

        let mut ledger = Ledger::new(&path);
        let mut r = record(Some("D1"), "A1", "glens_house_D1.pdf");
        r.set(columns::AGENCY_NAME, "Glen's House");
        r.set(columns::TITLE, "Inspection");
        ledger.upsert(r);
        ledger.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first_line = text.lines().next().unwrap();
        assert!(first_line.starts_with("\"agency_name\",\"agency_id\",\"Title\""));
        assert!(!first_line.contains("CreatedDate"));

        let reloaded = Ledger::load(&path).unwrap();
        let back = reloaded.get_by_id("D1").unwrap();
        assert_eq!(back.title.as_deref(), Some("Inspection"));
        assert_eq!(back.agency_id.as_deref(), Some("A1"));
        assert_eq!(back.agency_name.as_deref(), Some("Glen's House"));
    }

    #[test]
    fn test_records_sorted_keyed_then_unkeyed() {
        let mut ledger = Ledger::new("unused.csv");
        ledger.upsert(record(None, "", "zeta.pdf"));
        ledger.upsert(record(Some("D2"), "B", "b.pdf"));
        ledger.upsert(record(Some("D9"), "A", "c.pdf"));
        ledger.upsert(record(Some("D1"), "B", "a.pdf"));
        ledger.upsert(record(None, "", "alpha.pdf"));

        let order: Vec<&str> = ledger
            .records()
            .iter()
            .map(|r| r.generated_filename.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["c.pdf", "a.pdf", "b.pdf", "alpha.pdf", "zeta.pdf"]);
    }

    #[test]
    fn test_upsert_absorbs_unkeyed_row_with_same_filename() {
        let mut ledger = Ledger::new("unused.csv");
        ledger.upsert(record(None, "", "x.pdf"));
        assert_eq!(ledger.len(), 1);

        ledger.upsert(record(Some("D1"), "A", "x.pdf"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get_by_id("D1").is_some());
    }

    #[test]
    fn test_find_by_filename_ignores_stale_index() {
        let mut ledger = Ledger::new("unused.csv");
        ledger.upsert(record(Some("D1"), "A", "old.pdf"));
        ledger.upsert(record(Some("D1"), "A", "new.pdf"));

        assert!(ledger.find_by_filename("old.pdf").is_none());
        assert_eq!(
            ledger.find_by_filename("new.pdf").and_then(|r| r.document_id.as_deref()),
            Some("D1")
        );
    }

    #[test]
    fn test_lookup_prefers_id() {
        let mut ledger = Ledger::new("unused.csv");
        ledger.upsert(record(Some("A"), "X", "x.pdf"));

        let (found, key) = ledger.lookup("B", Some("x.pdf")).unwrap();
        assert_eq!(key, LookupKey::Filename);
        assert_eq!(found.document_id.as_deref(), Some("A"));

        let (_, key) = ledger.lookup("A", Some("other.pdf")).unwrap();
        assert_eq!(key, LookupKey::Id);
    }

    #[test]
    fn test_csv_table_require_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "agency_id,Title\nA,T\n").unwrap();

        let table = CsvTable::read(&path).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(matches!(
            table.require_column(&path, "ContentDocumentId"),
            Err(ConfigurationError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_write_bytes_atomic_creates_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.bin");
        write_bytes_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }
}
