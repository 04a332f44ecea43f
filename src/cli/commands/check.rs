//! Ledger integrity check command.

use std::path::PathBuf;

use console::style;

use crate::cli::helpers::require_dir;
use crate::config::Settings;
use crate::error::ConfigurationError;
use crate::ledger::Ledger;
use crate::services::audit_ledger;

/// Report ledger violations; fails when any are found.
pub async fn cmd_check(
    settings: &Settings,
    metadata_csv: Option<PathBuf>,
    download_dir: Option<PathBuf>,
    verify: bool,
) -> anyhow::Result<()> {
    let (ledger_path, download_dir) = match (metadata_csv, download_dir) {
        (Some(csv), Some(dir)) => (csv, dir),
        (Some(csv), None) => {
            let dir = csv
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (csv, dir)
        }
        (None, Some(dir)) => {
            require_dir(&dir)?;
            (settings.ledger_path(&dir), dir)
        }
        (None, None) => anyhow::bail!("pass --metadata-csv or --download-dir"),
    };

    if !ledger_path.is_file() {
        return Err(ConfigurationError::MissingInput(ledger_path).into());
    }
    let ledger = Ledger::load(&ledger_path)?;

    println!(
        "{} Checking {} entries in {}",
        style("→").cyan(),
        ledger.len(),
        ledger_path.display()
    );

    let report = tokio::task::block_in_place(|| audit_ledger(&ledger, &download_dir, verify));

    for (status, count) in &report.status_counts {
        println!("  {} {}: {}", style("→").dim(), status, count);
    }

    for duplicate in &report.duplicate_checksums {
        println!(
            "  {} {} shared by {}",
            style("!").yellow(),
            duplicate.checksum,
            duplicate.documents.join(", ")
        );
    }
    for document in &report.missing_checksum {
        println!("  {} {} has no checksum", style("✗").red(), document);
    }
    for (document, path) in &report.missing_file {
        let path = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "no recorded path".to_string());
        println!("  {} {} file missing ({})", style("✗").red(), document, path);
    }
    for mismatch in &report.hash_mismatches {
        println!(
            "  {} {} at {}: recorded {}, actual {}",
            style("✗").red(),
            mismatch.document,
            mismatch.path.display(),
            mismatch.recorded,
            mismatch.actual
        );
    }
    for (document, path) in &report.unreadable {
        println!(
            "  {} {} unreadable at {}",
            style("✗").red(),
            document,
            path.display()
        );
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} integrity violations in {}",
            report.violations(),
            ledger_path.display()
        );
    }

    if verify {
        println!(
            "{} Ledger is consistent ({} files re-hashed)",
            style("✓").green(),
            report.verified
        );
    } else {
        println!("{} Ledger is consistent", style("✓").green());
    }
    Ok(())
}
