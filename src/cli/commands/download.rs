//! Batch download command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{build_client, progress_bar, read_listing};
use crate::config::Settings;
use crate::ledger::Ledger;
use crate::naming::FilenamePolicy;
use crate::services::{
    MismatchPolicy, ReconcileConfig, ReconcileEvent, ReconcileMode, ReconcileService,
};

/// Flags for a download run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub metadata_csv: Option<PathBuf>,
    pub skip_existing: bool,
    pub limit: Option<usize>,
    /// Seconds to wait after each request.
    pub sleep: Option<f64>,
    pub policy: FilenamePolicy,
    pub strict: bool,
}

/// Download every document in a listing and update the ledger.
pub async fn cmd_download(
    settings: &Settings,
    csv: &Path,
    download_dir: &Path,
    options: DownloadOptions,
) -> anyhow::Result<()> {
    let input = read_listing(csv)?;
    std::fs::create_dir_all(download_dir)
        .with_context(|| format!("failed to create {}", download_dir.display()))?;

    let ledger_path = options
        .metadata_csv
        .clone()
        .unwrap_or_else(|| settings.ledger_path(download_dir));
    let mut ledger = Ledger::load(&ledger_path)?;

    let delay = options.sleep.map(sleep_duration).transpose()?;
    let client = build_client(settings, delay)?;

    println!(
        "{} Reconciling {} rows against {} ({} existing entries)",
        style("→").cyan(),
        input.rows.len(),
        ledger_path.display(),
        ledger.len()
    );

    let service = ReconcileService::new(
        Arc::new(client),
        ReconcileConfig {
            download_dir: download_dir.to_path_buf(),
            mode: ReconcileMode {
                policy: options.policy,
                skip_existing: options.skip_existing,
                mismatch: if options.strict {
                    MismatchPolicy::Abort
                } else {
                    MismatchPolicy::Record
                },
            },
            limit: options.limit,
        },
    );

    let (event_tx, mut event_rx) = mpsc::channel::<ReconcileEvent>(100);

    let event_handler = tokio::spawn(async move {
        let mut pb = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                ReconcileEvent::Started { total } => {
                    pb = Some(progress_bar(total as u64));
                }
                ReconcileEvent::Processing { document_id } => {
                    if let Some(ref pb) = pb {
                        pb.set_message(document_id);
                    }
                }
                ReconcileEvent::Skipped { .. } | ReconcileEvent::Downloaded { .. } => {
                    if let Some(ref pb) = pb {
                        pb.inc(1);
                    }
                }
                ReconcileEvent::IdMismatch {
                    document_id,
                    recorded_id,
                    path,
                } => {
                    let line = format!(
                        "{} {} exists but is recorded for {}; re-fetching {}",
                        style("!").yellow(),
                        path.display(),
                        recorded_id.as_deref().unwrap_or("no id"),
                        document_id
                    );
                    match pb {
                        Some(ref pb) => pb.println(line),
                        None => eprintln!("{}", line),
                    }
                }
                ReconcileEvent::Failed { document_id, error } => {
                    let line = format!(
                        "{} Failed {}: {}",
                        style("✗").red(),
                        document_id.as_deref().unwrap_or("<no id>"),
                        error
                    );
                    match pb {
                        Some(ref pb) => {
                            pb.println(line);
                            pb.inc(1);
                        }
                        None => eprintln!("{}", line),
                    }
                }
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
    });

    let result = service.run(&input, &mut ledger, event_tx).await;

    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    let summary = result.with_context(|| {
        format!(
            "download stopped; ledger progress saved to {}",
            ledger_path.display()
        )
    })?;

    println!(
        "{} Downloaded {} documents",
        style("✓").green(),
        summary.downloaded
    );
    if summary.verified > 0 {
        println!(
            "  {} {} matched existing files",
            style("→").dim(),
            summary.verified
        );
    }
    if summary.skipped > 0 {
        println!(
            "  {} {} skipped (already recorded by id)",
            style("→").dim(),
            summary.skipped
        );
    }
    if summary.carried_forward > 0 {
        println!(
            "  {} {} ledger entries carried forward",
            style("→").dim(),
            summary.carried_forward
        );
    }
    if summary.failed > 0 {
        println!("  {} {} failed", style("!").yellow(), summary.failed);
    }
    println!("  {} Ledger: {}", style("→").dim(), ledger_path.display());

    Ok(())
}

/// Convert `--sleep` seconds into a delay; values a `Duration` cannot hold are errors.
fn sleep_duration(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow::anyhow!("invalid --sleep value {}: {}", secs, e))
}
