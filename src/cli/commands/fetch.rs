//! Single-document fetch command.
//!
//! Runs the reconcile engine over one row with skipping disabled and
//! mismatches fatal, so an existing file is always re-verified.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{build_client, read_listing};
use crate::config::Settings;
use crate::ledger::{CsvTable, Ledger};
use crate::models::{columns, DocumentRecord};
use crate::naming::{filename_for_record, FilenamePolicy};
use crate::services::{
    MismatchPolicy, ReconcileConfig, ReconcileEvent, ReconcileMode, ReconcileService,
};

/// Filename parts given on the command line instead of a listing.
#[derive(Debug, Clone, Default)]
pub struct DocumentArgs {
    pub agency: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
}

/// Build the single input row from a listing CSV or from flags.
fn input_row(
    document_id: &str,
    csv: Option<&Path>,
    document: DocumentArgs,
) -> anyhow::Result<CsvTable> {
    match csv {
        Some(path) => {
            let listing = read_listing(path)?;
            let row = listing
                .rows
                .iter()
                .find(|r| r.document_id.as_deref() == Some(document_id))
                .cloned()
                .with_context(|| format!("{} not found in {}", document_id, path.display()))?;
            Ok(CsvTable {
                header: listing.header,
                rows: vec![row],
            })
        }
        None => {
            let mut row = DocumentRecord::new(document_id);
            row.agency_name = document.agency;
            row.title = document.title;
            row.created_date = document.date;
            let header = [
                columns::DOCUMENT_ID,
                columns::AGENCY_NAME,
                columns::TITLE,
                columns::CREATED_DATE,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect();
            Ok(CsvTable {
                header,
                rows: vec![row],
            })
        }
    }
}

/// Fetch one document, verify it, and record it in the ledger.
pub async fn cmd_fetch(
    settings: &Settings,
    document_id: &str,
    csv: Option<&Path>,
    document: DocumentArgs,
    download_dir: &Path,
    policy: FilenamePolicy,
) -> anyhow::Result<()> {
    let input = input_row(document_id, csv, document)?;

    // Bad filename inputs are fatal here unless the listing supplies a name
    if let Some(row) = input.rows.first() {
        if let Err(e) = filename_for_record(policy, row) {
            if row.generated_filename.is_none() {
                return Err(e).context(format!("cannot name {}", document_id));
            }
        }
    }

    std::fs::create_dir_all(download_dir)
        .with_context(|| format!("failed to create {}", download_dir.display()))?;
    let ledger_path = settings.ledger_path(download_dir);
    let mut ledger = Ledger::load(&ledger_path)?;

    let client = build_client(settings, None)?;
    let service = ReconcileService::new(
        Arc::new(client),
        ReconcileConfig {
            download_dir: download_dir.to_path_buf(),
            mode: ReconcileMode {
                policy,
                skip_existing: false,
                mismatch: MismatchPolicy::Abort,
            },
            limit: None,
        },
    );

    let (event_tx, mut event_rx) = mpsc::channel::<ReconcileEvent>(16);
    let event_handler = tokio::spawn(async move {
        let mut outcome = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                ReconcileEvent::Downloaded { path, verified, .. } => {
                    outcome = Some(Ok((path, verified)));
                }
                ReconcileEvent::Failed { error, .. } => outcome = Some(Err(error)),
                _ => {}
            }
        }
        outcome
    });

    println!("{} Fetching {}", style("→").cyan(), document_id);
    let result = service.run(&input, &mut ledger, event_tx).await;
    let outcome = event_handler.await.unwrap_or_else(|e| {
        tracing::warn!("Event handler task failed: {}", e);
        None
    });
    result?;

    match outcome {
        Some(Ok((path, true))) => {
            println!(
                "{} {} already matches {}",
                style("✓").green(),
                document_id,
                path.display()
            );
            Ok(())
        }
        Some(Ok((path, false))) => {
            println!(
                "{} Saved {} to {}",
                style("✓").green(),
                document_id,
                path.display()
            );
            Ok(())
        }
        Some(Err(error)) => anyhow::bail!("failed to fetch {}: {}", document_id, error),
        None => anyhow::bail!("no result for {}", document_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_input_row_from_flags() {
        let table = input_row(
            "0698z0000061FxYAAU",
            None,
            DocumentArgs {
                agency: Some("Glen's House".to_string()),
                title: Some("Renewal".to_string()),
                date: Some("2024-03-05".to_string()),
            },
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].agency_name.as_deref(), Some("Glen's House"));
        assert!(table.has_column(columns::DOCUMENT_ID));
    }

    #[test]
    fn test_input_row_from_listing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("listing.csv");
        std::fs::write(
            &path,
            "ContentDocumentId,Title,CreatedDate,agency_name\n\
             A00000000000001,First,2024-01-01,Agency One\n\
             A00000000000002,Second,2024-02-02,Agency Two\n",
        )
        .unwrap();

        let table = input_row("A00000000000002", Some(&path), DocumentArgs::default()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].title.as_deref(), Some("Second"));

        assert!(input_row("MISSING", Some(&path), DocumentArgs::default()).is_err());
    }
}
