//! Agency and document discovery command.

use std::path::Path;

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{build_client, progress_bar};
use crate::config::Settings;
use crate::services::{DiscoveryConfig, DiscoveryEvent, DiscoveryService};

/// Discover agencies and their document listings.
pub async fn cmd_discover(
    settings: &Settings,
    run_dir: &Path,
    save_individual_files: bool,
    overwrite_individual_files: bool,
    remove_individual_files: bool,
) -> anyhow::Result<()> {
    if remove_individual_files && !save_individual_files {
        println!(
            "{} --remove-files only applies with --save-individual-files",
            style("!").yellow()
        );
    }

    let client = build_client(settings, None)?;
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();

    println!(
        "{} Discovering documents from {} into {}",
        style("→").cyan(),
        client.base_url(),
        run_dir.display()
    );

    let service = DiscoveryService::new(
        client,
        DiscoveryConfig {
            run_dir: run_dir.to_path_buf(),
            date,
            save_individual_files,
            overwrite_individual_files,
            remove_individual_files,
        },
    );

    let (event_tx, mut event_rx) = mpsc::channel::<DiscoveryEvent>(100);

    let event_handler = tokio::spawn(async move {
        let mut pb = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                DiscoveryEvent::AgenciesListed { total } => {
                    pb = Some(progress_bar(total as u64));
                }
                DiscoveryEvent::AgencyCompleted {
                    agency_id,
                    documents,
                    reused,
                } => {
                    if let Some(ref pb) = pb {
                        let source = if reused { "cached" } else { "fetched" };
                        pb.set_message(format!("{} ({} documents, {})", agency_id, documents, source));
                        pb.inc(1);
                    }
                }
                DiscoveryEvent::AgencyFailed { agency_id, error } => {
                    let line = format!("{} {}: {}", style("✗").red(), agency_id, error);
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

    let result = service.run(event_tx).await;

    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    let result = result?;

    println!(
        "{} Listed {} documents from {} agencies",
        style("✓").green(),
        result.documents,
        result.agencies
    );
    println!(
        "  {} Agencies: {}",
        style("→").dim(),
        result.agency_csv.display()
    );
    println!(
        "  {} Documents: {}",
        style("→").dim(),
        result.combined_csv.display()
    );

    if result.agencies_failed > 0 {
        println!(
            "  {} {} agencies failed and were skipped",
            style("!").yellow(),
            result.agencies_failed
        );
    }
    if result.invalid_dates > 0 {
        println!(
            "  {} {} documents have no generated filename (invalid date)",
            style("!").yellow(),
            result.invalid_dates
        );
    }

    Ok(())
}
