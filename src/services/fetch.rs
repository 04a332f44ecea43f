//! Single-document fetch with integrity verification.
//!
//! The network request is always made, even when a file already exists at
//! the target: the existing file is only trusted if its hash matches what
//! the upstream serves now.

use std::path::{Path, PathBuf};

use crate::error::{ContentMismatchError, VerifyError};
use crate::ledger::write_bytes_atomic;
use crate::scrapers::ContentSource;
use crate::utils::{compute_hash, hash_file};

/// Result of a verified fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No file existed; the fetched bytes were written.
    Written {
        path: PathBuf,
        checksum: String,
        bytes: usize,
    },
    /// A file existed and its content matches the fetched bytes.
    Verified { path: PathBuf, checksum: String },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written { path, .. } | Self::Verified { path, .. } => path,
        }
    }

    pub fn checksum(&self) -> &str {
        match self {
            Self::Written { checksum, .. } | Self::Verified { checksum, .. } => checksum,
        }
    }
}

/// Fetch a document and reconcile it with whatever is at `target`.
pub async fn fetch_verified(
    source: &dyn ContentSource,
    document_id: &str,
    target: &Path,
) -> Result<FetchOutcome, VerifyError> {
    let content = source.fetch_document(document_id).await?;
    let fetched = compute_hash(&content);

    if target.exists() {
        let existing = hash_file(target).map_err(|source| VerifyError::Io {
            path: target.to_path_buf(),
            source,
        })?;

        if existing == fetched {
            tracing::debug!("{} matches {}", document_id, target.display());
            return Ok(FetchOutcome::Verified {
                path: target.to_path_buf(),
                checksum: fetched,
            });
        }

        tracing::warn!(
            "Content mismatch for {} at {}: existing {}, fetched {}",
            document_id,
            target.display(),
            existing,
            fetched
        );
        return Err(ContentMismatchError {
            document_id: document_id.to_string(),
            path: target.to_path_buf(),
            existing_sha256: existing,
            fetched_sha256: fetched,
        }
        .into());
    }

    write_bytes_atomic(target, &content).map_err(|source| VerifyError::Io {
        path: target.to_path_buf(),
        source,
    })?;
    tracing::info!(
        "Saved {} ({} bytes) to {}",
        document_id,
        content.len(),
        target.display()
    );

    Ok(FetchOutcome::Written {
        path: target.to_path_buf(),
        checksum: fetched,
        bytes: content.len(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// In-memory content source that counts calls.
    #[derive(Default)]
    pub(crate) struct StubSource {
        pub documents: HashMap<String, Vec<u8>>,
        pub calls: AtomicUsize,
    }

    impl StubSource {
        pub(crate) fn with(docs: &[(&str, &str)]) -> Self {
            Self {
                documents: docs
                    .iter()
                    .map(|(id, text)| (id.to_string(), text.as_bytes().to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentSource for StubSource {
        async fn fetch_document(&self, document_id: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(document_id)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    document_id: document_id.to_string(),
                    status: 404,
                })
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_then_verifies() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a_D1.pdf");
        let source = StubSource::with(&[("D1", "%PDF-1.4 one")]);

        let first = fetch_verified(&source, "D1", &target).await.unwrap();
        assert!(matches!(first, FetchOutcome::Written { bytes: 12, .. }));
        assert_eq!(first.checksum(), compute_hash(b"%PDF-1.4 one"));

        let second = fetch_verified(&source, "D1", &target).await.unwrap();
        assert!(matches!(second, FetchOutcome::Verified { .. }));
        assert_eq!(second.checksum(), first.checksum());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_mismatch_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a_D1.pdf");
        std::fs::write(&target, b"old bytes").unwrap();
        let source = StubSource::with(&[("D1", "new bytes")]);

        let err = fetch_verified(&source, "D1", &target).await.unwrap_err();
        match err {
            VerifyError::Mismatch(m) => {
                assert_eq!(m.existing_sha256, compute_hash(b"old bytes"));
                assert_eq!(m.fetched_sha256, compute_hash(b"new bytes"));
                assert_eq!(m.path, target);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(std::fs::read(&target).unwrap(), b"old bytes");
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("new/sub/dir/a_D1.pdf");
        let source = StubSource::with(&[("D1", "content")]);

        fetch_verified(&source, "D1", &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_fetch_error_writes_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing.pdf");
        let source = StubSource::default();

        let err = fetch_verified(&source, "NOPE", &target).await.unwrap_err();
        assert!(matches!(err, VerifyError::Fetch(FetchError::Status { status: 404, .. })));
        assert!(!target.exists());
    }
}
