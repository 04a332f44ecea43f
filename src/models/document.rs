//! Ledger document records.
//!
//! A record is one row of the download ledger. Columns the crate understands
//! are held in typed fields; everything else the upstream listing carried
//! (`Id`, `ContentBodyId`, ...) rides along in `extra` so that rewriting a
//! ledger never drops data.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Column names shared by listings and the ledger.
pub mod columns {
    pub const DOCUMENT_ID: &str = "ContentDocumentId";
    pub const AGENCY_ID: &str = "agency_id";
    pub const AGENCY_NAME: &str = "agency_name";
    pub const TITLE: &str = "Title";
    pub const CREATED_DATE: &str = "CreatedDate";
    pub const FILE_EXTENSION: &str = "FileExtension";
    pub const GENERATED_FILENAME: &str = "generated_filename";
    pub const DOWNLOADED_FILENAME: &str = "downloaded_filename";
    pub const DOWNLOADED_PATH: &str = "downloaded_path";
    pub const SHA256: &str = "sha256";
    pub const DOWNLOADED_AT: &str = "downloaded_at_utc";
    pub const DOWNLOAD_STATUS: &str = "download_status";
    pub const ID_MATCH_CHECKED: &str = "id_match_checked";
}

/// Columns always present in a written ledger, appended after any columns
/// inherited from prior ledgers or input listings.
pub const LEDGER_EXTRA_COLUMNS: [&str; 8] = [
    columns::GENERATED_FILENAME,
    columns::DOWNLOADED_FILENAME,
    columns::DOWNLOADED_PATH,
    columns::SHA256,
    columns::DOWNLOADED_AT,
    columns::DOWNLOAD_STATUS,
    columns::ID_MATCH_CHECKED,
    columns::DOCUMENT_ID,
];

/// Terminal state of a document in the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Unknown,
    Downloaded,
    SkippedMatching,
    Failed,
    Backfilled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Downloaded => "downloaded",
            Self::SkippedMatching => "skipped_matching",
            Self::Failed => "failed",
            Self::Backfilled => "backfilled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "downloaded" => Some(Self::Downloaded),
            // Older ledgers spell it this way.
            "skipped_matching" | "skipped_id_match" => Some(Self::SkippedMatching),
            "failed" => Some(Self::Failed),
            "backfilled" => Some(Self::Backfilled),
            _ => None,
        }
    }

    /// Statuses that promise a checksum and a file on disk.
    pub fn requires_file(&self) -> bool {
        matches!(self, Self::Downloaded | Self::SkippedMatching)
    }
}

/// One document known to the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentRecord {
    pub document_id: Option<String>,
    pub agency_id: Option<String>,
    pub agency_name: Option<String>,
    pub title: Option<String>,
    pub created_date: Option<String>,
    pub file_extension: Option<String>,
    pub generated_filename: Option<String>,
    pub downloaded_filename: Option<String>,
    pub local_path: Option<PathBuf>,
    pub checksum: Option<String>,
    pub status: DownloadStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    pub id_match_checked: Option<bool>,
    /// Columns with no typed counterpart, keyed by column name.
    pub extra: BTreeMap<String, String>,
}

impl DocumentRecord {
    /// Create an empty record for a document id.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Default::default()
        }
    }

    /// Build a record from `(column, value)` pairs, e.g. a CSV row.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = Self::default();
        for (column, value) in fields {
            record.set(column, value);
        }
        record
    }

    /// Read a column as it would be written to CSV. Empty values are `None`.
    pub fn get(&self, column: &str) -> Option<Cow<'_, str>> {
        use columns::*;

        match column {
            DOCUMENT_ID => self.document_id.as_deref().map(Cow::Borrowed),
            AGENCY_ID => self.agency_id.as_deref().map(Cow::Borrowed),
            AGENCY_NAME => self.agency_name.as_deref().map(Cow::Borrowed),
            TITLE => self.title.as_deref().map(Cow::Borrowed),
            CREATED_DATE => self.created_date.as_deref().map(Cow::Borrowed),
            FILE_EXTENSION => self.file_extension.as_deref().map(Cow::Borrowed),
            GENERATED_FILENAME => self.generated_filename.as_deref().map(Cow::Borrowed),
            DOWNLOADED_FILENAME => self.downloaded_filename.as_deref().map(Cow::Borrowed),
            DOWNLOADED_PATH => self.local_path.as_ref().map(|p| p.to_string_lossy()),
            SHA256 => self.checksum.as_deref().map(Cow::Borrowed),
            DOWNLOAD_STATUS => match self.status {
                DownloadStatus::Unknown => self.extra.get(column).map(|s| Cow::Borrowed(s.as_str())),
                status => Some(Cow::Borrowed(status.as_str())),
            },
            DOWNLOADED_AT => match self.fetched_at {
                Some(at) => Some(Cow::Owned(at.to_rfc3339_opts(SecondsFormat::Micros, false))),
                None => self.extra.get(column).map(|s| Cow::Borrowed(s.as_str())),
            },
            ID_MATCH_CHECKED => self
                .id_match_checked
                .map(|checked| Cow::Borrowed(if checked { "true" } else { "false" })),
            other => self.extra.get(other).map(|s| Cow::Borrowed(s.as_str())),
        }
    }

    /// Assign a column from its CSV text. Blank values clear the column.
    pub fn set(&mut self, column: &str, value: &str) {
        use columns::*;

        let value = value.trim();
        let text = (!value.is_empty()).then(|| value.to_string());

        match column {
            DOCUMENT_ID => self.document_id = text,
            AGENCY_ID => self.agency_id = text,
            AGENCY_NAME => self.agency_name = text,
            TITLE => self.title = text,
            CREATED_DATE => self.created_date = text,
            FILE_EXTENSION => self.file_extension = text,
            GENERATED_FILENAME => self.generated_filename = text,
            DOWNLOADED_FILENAME => self.downloaded_filename = text,
            DOWNLOADED_PATH => self.local_path = text.map(PathBuf::from),
            SHA256 => self.checksum = text.map(|s| s.to_ascii_lowercase()),
            DOWNLOAD_STATUS => {
                self.extra.remove(column);
                self.status = match text {
                    None => DownloadStatus::Unknown,
                    Some(raw) => match DownloadStatus::from_str(&raw) {
                        Some(status) => status,
                        None => {
                            self.extra.insert(column.to_string(), raw);
                            DownloadStatus::Unknown
                        }
                    },
                };
            }
            DOWNLOADED_AT => {
                self.extra.remove(column);
                self.fetched_at = None;
                if let Some(raw) = text {
                    match DateTime::parse_from_rfc3339(&raw) {
                        Ok(at) => self.fetched_at = Some(at.with_timezone(&Utc)),
                        Err(_) => {
                            self.extra.insert(column.to_string(), raw);
                        }
                    }
                }
            }
            ID_MATCH_CHECKED => {
                self.id_match_checked = text.map(|s| s.eq_ignore_ascii_case("true"));
            }
            other => match text {
                Some(v) => {
                    self.extra.insert(other.to_string(), v);
                }
                None => {
                    self.extra.remove(other);
                }
            },
        }
    }

    /// Every non-empty column of this record, in no particular order.
    pub fn present_columns(&self) -> Vec<(String, String)> {
        use columns::*;

        let mut names: Vec<&str> = vec![
            DOCUMENT_ID,
            AGENCY_ID,
            AGENCY_NAME,
            TITLE,
            CREATED_DATE,
            FILE_EXTENSION,
            GENERATED_FILENAME,
            DOWNLOADED_FILENAME,
            DOWNLOADED_PATH,
            SHA256,
            DOWNLOADED_AT,
            DOWNLOAD_STATUS,
            ID_MATCH_CHECKED,
        ];
        names.extend(
            self.extra
                .keys()
                .map(String::as_str)
                .filter(|k| *k != DOWNLOAD_STATUS && *k != DOWNLOADED_AT),
        );

        names
            .into_iter()
            .filter_map(|name| self.get(name).map(|v| (name.to_string(), v.into_owned())))
            .collect()
    }

    /// Copy every non-empty column of `other` over this record.
    pub fn overlay(&mut self, other: &DocumentRecord) {
        for (column, value) in other.present_columns() {
            self.set(&column, &value);
        }
    }

    /// Copy non-empty columns of `other` only where this record has none.
    pub fn fill_gaps(&mut self, other: &DocumentRecord) {
        for (column, value) in other.present_columns() {
            if self.get(&column).is_none() {
                self.set(&column, &value);
            }
        }
    }

    /// Filename this record is known under, for weak-key lookups.
    pub fn filename_key(&self) -> Option<&str> {
        self.generated_filename
            .as_deref()
            .or(self.downloaded_filename.as_deref())
    }

    /// Values for `header`, in order, with absent columns as empty strings.
    pub fn to_row(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|column| {
                self.get(column)
                    .map(Cow::into_owned)
                    .unwrap_or_default()
            })
            .collect()
    }
}
