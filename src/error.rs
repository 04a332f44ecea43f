//! Error taxonomy for acquisition, verification and ledger handling.
//!
//! Library code returns these typed errors; the CLI layer wraps them in
//! `anyhow` with additional context.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed input to filename derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("document id is empty")]
    EmptyDocumentId,

    #[error("month in document date {date:?} cannot be greater than 12 (got {month})")]
    InvalidMonth { date: String, month: u32 },

    #[error("document date {0:?} must be in YYYY-MM-DD format")]
    InvalidDateFormat(String),
}

/// Network or upstream-format failure while retrieving content.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {document_id} failed: {source}")]
    Request {
        document_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned HTTP {status} for {document_id}")]
    Status { document_id: String, status: u16 },

    #[error("response for {document_id} is missing its payload: {detail}")]
    MissingPayload { document_id: String, detail: String },

    #[error("payload for {document_id} is not valid base64: {source}")]
    Decode {
        document_id: String,
        #[source]
        source: base64::DecodeError,
    },
}

impl FetchError {
    /// The document (or agency) id the failed request was made for.
    pub fn document_id(&self) -> &str {
        match self {
            Self::Request { document_id, .. }
            | Self::Status { document_id, .. }
            | Self::MissingPayload { document_id, .. }
            | Self::Decode { document_id, .. } => document_id,
        }
    }
}

/// Freshly fetched content disagrees with the file already on disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "file exists but content differs (SHA256 mismatch): existing {existing_sha256}, fetched {fetched_sha256}, file {}",
    path.display()
)]
pub struct ContentMismatchError {
    pub document_id: String,
    pub path: PathBuf,
    pub existing_sha256: String,
    pub fetched_sha256: String,
}

/// Unrecoverable setup problem detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("{} is missing required column {column:?}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure reading or writing a CSV ledger or listing.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Outcome errors of a verified fetch.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Mismatch(#[from] ContentMismatchError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A batch run stopped before completing.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Mismatch(#[from] ContentMismatchError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Discovery could not produce its output files.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("agency listing failed: {0}")]
    AgencyList(#[source] FetchError),

    #[error(transparent)]
    Csv(#[from] LedgerError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_both_hashes_and_path() {
        let err = ContentMismatchError {
            document_id: "069cs0000104BR0AAM".to_string(),
            path: PathBuf::from("/tmp/a.pdf"),
            existing_sha256: "aaa".to_string(),
            fetched_sha256: "bbb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaa"));
        assert!(msg.contains("bbb"));
        assert!(msg.contains("/tmp/a.pdf"));
    }

    #[test]
    fn test_fetch_error_document_id() {
        let err = FetchError::Status {
            document_id: "0698z0000061FxYAAU".to_string(),
            status: 503,
        };
        assert_eq!(err.document_id(), "0698z0000061FxYAAU");
        assert!(err.to_string().contains("503"));
    }
}
