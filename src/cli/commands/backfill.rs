//! Ledger backfill command.

use std::path::Path;

use console::style;

use crate::cli::helpers::require_dir;
use crate::config::Settings;
use crate::error::ConfigurationError;
use crate::ledger::{CsvTable, Ledger};
use crate::services::BackfillService;

/// Rebuild the ledger from PDFs already in `pdf_dir`.
pub async fn cmd_backfill(
    settings: &Settings,
    pdf_dir: &Path,
    metadata_csv: Option<&Path>,
    source_csv: Option<&Path>,
) -> anyhow::Result<()> {
    require_dir(pdf_dir)?;

    let enrichment = match source_csv {
        Some(path) if !path.is_file() => {
            return Err(ConfigurationError::MissingInput(path.to_path_buf()).into());
        }
        Some(path) => Some(CsvTable::read(path)?),
        None => None,
    };

    let ledger_path = metadata_csv
        .map(Path::to_path_buf)
        .unwrap_or_else(|| settings.ledger_path(pdf_dir));
    let mut ledger = Ledger::load(&ledger_path)?;

    println!(
        "{} Scanning {} ({} existing ledger entries)",
        style("→").cyan(),
        pdf_dir.display(),
        ledger.len()
    );

    let service = BackfillService::new(pdf_dir);
    let summary = tokio::task::block_in_place(|| service.run(&mut ledger, enrichment.as_ref()))?;

    println!(
        "{} Wrote {} rows to {}",
        style("✓").green(),
        summary.rows_written,
        ledger_path.display()
    );
    println!(
        "  {} {} PDFs scanned, {} with a document id",
        style("→").dim(),
        summary.scanned,
        summary.inferred
    );
    if summary.unknown > 0 {
        println!(
            "  {} {} files without an inferable id kept as unkeyed rows",
            style("!").yellow(),
            summary.unknown
        );
    }
    if summary.failed > 0 {
        println!(
            "  {} {} files could not be read",
            style("!").yellow(),
            summary.failed
        );
    }

    Ok(())
}
