//! Batch download reconciliation against the ledger.
//!
//! For each input row the service decides whether a local file already
//! represents that exact document id. Files are only trusted without a
//! network call when the ledger located them by id; a filename hit for a
//! different id always leads to a fresh fetch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use super::fetch::{fetch_verified, FetchOutcome};
use crate::error::{ReconcileError, VerifyError};
use crate::ledger::{CsvTable, Ledger, LookupKey};
use crate::models::{DocumentRecord, DownloadStatus};
use crate::naming::{filename_for_record, FilenamePolicy};
use crate::scrapers::ContentSource;
use crate::utils::hash_file;

/// What to do when fetched content disagrees with an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Mark the row failed and keep going.
    #[default]
    Record,
    /// Save the ledger as it stands and stop the run.
    Abort,
}

/// Policy flags for a reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileMode {
    pub policy: FilenamePolicy,
    /// Accept files already on disk whose ledger entry has the same id.
    pub skip_existing: bool,
    pub mismatch: MismatchPolicy,
}

/// Configuration for the reconcile service.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub download_dir: PathBuf,
    pub mode: ReconcileMode,
    /// Maximum number of rows to process.
    pub limit: Option<usize>,
}

/// Events emitted while reconciling.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    /// Run started with this many input rows
    Started { total: usize },
    /// A row is about to be handled
    Processing { document_id: String },
    /// Existing file accepted without a fetch
    Skipped { document_id: String, path: PathBuf },
    /// A file exists but the ledger ties it to another id
    IdMismatch {
        document_id: String,
        recorded_id: Option<String>,
        path: PathBuf,
    },
    /// Fetch succeeded; `verified` when an existing file already matched
    Downloaded {
        document_id: String,
        path: PathBuf,
        verified: bool,
    },
    /// Row failed
    Failed {
        document_id: Option<String>,
        error: String,
    },
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub processed: usize,
    pub downloaded: usize,
    /// Subset of `downloaded` where the existing file already matched.
    pub verified: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Ledger rows not touched by this batch.
    pub carried_forward: usize,
}

/// Drives verified fetches over an input listing and maintains the ledger.
pub struct ReconcileService {
    source: Arc<dyn ContentSource>,
    config: ReconcileConfig,
}

impl ReconcileService {
    pub fn new(source: Arc<dyn ContentSource>, config: ReconcileConfig) -> Self {
        Self { source, config }
    }

    /// Reconcile every input row, then save the ledger.
    pub async fn run(
        &self,
        input: &CsvTable,
        ledger: &mut Ledger,
        event_tx: mpsc::Sender<ReconcileEvent>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();
        let prior_rows = ledger.len();
        let mut seen: HashSet<String> = HashSet::new();
        let mut touched = 0usize;

        ledger.merge_columns(input.header.iter().map(String::as_str));

        let total = match self.config.limit {
            Some(max) => input.rows.len().min(max),
            None => input.rows.len(),
        };
        let _ = event_tx.send(ReconcileEvent::Started { total }).await;

        for row in &input.rows {
            if let Some(max) = self.config.limit {
                if summary.processed >= max {
                    break;
                }
            }

            let Some(document_id) = row.document_id.clone() else {
                tracing::warn!("Skipping row with missing ContentDocumentId");
                summary.failed += 1;
                let _ = event_tx
                    .send(ReconcileEvent::Failed {
                        document_id: None,
                        error: "missing ContentDocumentId".to_string(),
                    })
                    .await;
                continue;
            };

            let _ = event_tx
                .send(ReconcileEvent::Processing {
                    document_id: document_id.clone(),
                })
                .await;

            // Only the first occurrence of an id can hit a prior ledger row
            if seen.insert(document_id.clone()) && ledger.get_by_id(&document_id).is_some() {
                touched += 1;
            }

            let outcome = self.reconcile_row(&document_id, row, ledger, &event_tx).await;
            summary.processed += 1;

            match outcome {
                RowOutcome::Skipped => summary.skipped += 1,
                RowOutcome::Downloaded { verified } => {
                    summary.downloaded += 1;
                    if verified {
                        summary.verified += 1;
                    }
                }
                RowOutcome::Failed => summary.failed += 1,
                RowOutcome::Abort(mismatch) => {
                    tracing::error!(
                        "Aborting run on content mismatch for {}; saving ledger progress",
                        document_id
                    );
                    ledger.save()?;
                    return Err(mismatch.into());
                }
            }
        }

        summary.carried_forward = prior_rows.saturating_sub(touched);
        ledger.save()?;
        Ok(summary)
    }

    async fn reconcile_row(
        &self,
        document_id: &str,
        row: &DocumentRecord,
        ledger: &mut Ledger,
        event_tx: &mpsc::Sender<ReconcileEvent>,
    ) -> RowOutcome {
        let mode = self.config.mode;
        let download_dir = &self.config.download_dir;

        let target_name = match filename_for_record(mode.policy, row) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!(
                    "Cannot derive filename for {}: {}; falling back to generated_filename",
                    document_id,
                    e
                );
                row.generated_filename.clone()
            }
        };

        let found = ledger
            .lookup(document_id, target_name.as_deref())
            .or_else(|| {
                row.generated_filename
                    .as_deref()
                    .and_then(|f| ledger.find_by_filename(f))
                    .map(|r| (r, LookupKey::Filename))
            })
            .map(|(r, key)| (r.clone(), key));

        let id_match = matches!(found, Some((_, LookupKey::Id)));

        // Fields from a row found by filename for another id belong to that id
        let mut record = match &found {
            Some((entry, LookupKey::Id)) => entry.clone(),
            Some((entry, LookupKey::Filename)) if entry.document_id.is_none() => entry.clone(),
            _ => DocumentRecord::default(),
        };
        record.overlay(row);
        record.document_id = Some(document_id.to_string());
        if let Some(name) = &target_name {
            record.generated_filename = Some(name.clone());
        }
        record.id_match_checked = Some(true);

        let target_path = target_name.as_ref().map(|n| download_dir.join(n));
        let recorded_path = found
            .as_ref()
            .and_then(|(entry, _)| entry.local_path.as_ref())
            .map(|p| resolve_against(download_dir, p));
        let present = [target_path.clone(), recorded_path]
            .into_iter()
            .flatten()
            .find(|p| p.exists());

        if let Some(path) = &present {
            if mode.skip_existing && id_match {
                let checksum = match found.as_ref().and_then(|(e, _)| e.checksum.clone()) {
                    Some(existing) => Some(existing),
                    None => match hash_file(path) {
                        Ok(sum) => Some(sum),
                        Err(e) => {
                            tracing::warn!("Could not hash {}: {}", path.display(), e);
                            None
                        }
                    },
                };

                if let Some(checksum) = checksum {
                    record.checksum = Some(checksum);
                    record.local_path = Some(path.clone());
                    record.downloaded_filename = file_name(path);
                    record.status = DownloadStatus::SkippedMatching;
                    ledger.upsert(record);

                    tracing::info!("Skipping existing file with matching id: {}", path.display());
                    let _ = event_tx
                        .send(ReconcileEvent::Skipped {
                            document_id: document_id.to_string(),
                            path: path.clone(),
                        })
                        .await;
                    return RowOutcome::Skipped;
                }
            } else if mode.skip_existing {
                let recorded_id = found.as_ref().and_then(|(e, _)| e.document_id.clone());
                tracing::warn!(
                    "Existing file {} is recorded for id {:?}, not {}; re-fetching",
                    path.display(),
                    recorded_id,
                    document_id
                );
                let _ = event_tx
                    .send(ReconcileEvent::IdMismatch {
                        document_id: document_id.to_string(),
                        recorded_id,
                        path: path.clone(),
                    })
                    .await;
            }
        }

        let Some(fetch_path) = present.or(target_path) else {
            let error = "no usable filename (derivation failed and no generated_filename)";
            tracing::error!("Cannot fetch {}: {}", document_id, error);
            record.status = DownloadStatus::Failed;
            ledger.upsert(record);
            let _ = event_tx
                .send(ReconcileEvent::Failed {
                    document_id: Some(document_id.to_string()),
                    error: error.to_string(),
                })
                .await;
            return RowOutcome::Failed;
        };

        match fetch_verified(self.source.as_ref(), document_id, &fetch_path).await {
            Ok(outcome) => {
                let verified = matches!(outcome, FetchOutcome::Verified { .. });
                record.checksum = Some(outcome.checksum().to_string());
                record.local_path = Some(outcome.path().to_path_buf());
                record.downloaded_filename = file_name(outcome.path());
                record.fetched_at = Some(Utc::now());
                record.status = DownloadStatus::Downloaded;
                ledger.upsert(record);

                let _ = event_tx
                    .send(ReconcileEvent::Downloaded {
                        document_id: document_id.to_string(),
                        path: fetch_path,
                        verified,
                    })
                    .await;
                RowOutcome::Downloaded { verified }
            }
            Err(e) => {
                tracing::error!("Error fetching {}: {}", document_id, e);
                record.status = DownloadStatus::Failed;
                ledger.upsert(record);
                let _ = event_tx
                    .send(ReconcileEvent::Failed {
                        document_id: Some(document_id.to_string()),
                        error: e.to_string(),
                    })
                    .await;

                match e {
                    VerifyError::Mismatch(m) if mode.mismatch == MismatchPolicy::Abort => {
                        RowOutcome::Abort(m)
                    }
                    _ => RowOutcome::Failed,
                }
            }
        }
    }
}

enum RowOutcome {
    Skipped,
    Downloaded { verified: bool },
    Failed,
    Abort(crate::error::ContentMismatchError),
}

fn resolve_against(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
