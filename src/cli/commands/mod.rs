//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod backfill;
mod check;
mod discover;
mod download;
mod fetch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::naming::FilenamePolicy;

#[derive(Parser)]
#[command(name = "licacquire")]
#[command(about = "Licensing-search document acquisition and download ledger")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List agencies and their documents into a dated run directory
    Discover {
        /// Directory for the JSON and CSV outputs
        #[arg(long, default_value = ".")]
        run_dir: PathBuf,
        /// Keep per-agency <id>_pdf_content_details.{json,csv} files
        #[arg(long)]
        save_individual_files: bool,
        /// Re-query agencies whose per-agency files already exist
        #[arg(long)]
        overwrite: bool,
        /// Delete per-agency files after the combined CSV is written
        #[arg(long)]
        remove_files: bool,
    },

    /// Fetch one document and verify it against any existing file
    Fetch {
        /// Document id (e.g. 0698z0000061FxYAAU)
        document_id: String,
        /// Listing CSV to take agency, title and date from
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Agency name for the filename (without --csv)
        #[arg(long, conflicts_with = "csv")]
        agency: Option<String>,
        /// Document title for the filename (without --csv)
        #[arg(long, conflicts_with = "csv")]
        title: Option<String>,
        /// Document date, YYYY-MM-DD (without --csv)
        #[arg(long, conflicts_with = "csv")]
        date: Option<String>,
        /// Directory to save the document (default: configured download_dir, else ".")
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
        /// Filename policy (defaults to the configured policy)
        #[arg(long, value_enum)]
        policy: Option<FilenamePolicy>,
    },

    /// Download every document in a listing CSV and update the ledger
    Download {
        /// Listing CSV (e.g. <date>_combined_pdf_content_details.csv)
        #[arg(long)]
        csv: PathBuf,
        /// Directory to save documents
        #[arg(short, long)]
        download_dir: PathBuf,
        /// Ledger CSV (default: <download-dir>/facility_information_metadata.csv)
        #[arg(long)]
        metadata_csv: Option<PathBuf>,
        /// Re-fetch and verify files even when the ledger matches by id
        #[arg(long)]
        no_skip: bool,
        /// Maximum number of rows to process
        #[arg(short, long)]
        limit: Option<usize>,
        /// Seconds to wait after each request (overrides config)
        #[arg(long)]
        sleep: Option<f64>,
        /// Filename policy (defaults to the configured policy)
        #[arg(long, value_enum)]
        policy: Option<FilenamePolicy>,
        /// Stop the run on the first content mismatch
        #[arg(long)]
        strict: bool,
    },

    /// Rebuild the ledger from PDFs already on disk
    Backfill {
        /// Directory containing downloaded PDFs
        #[arg(long)]
        pdf_dir: PathBuf,
        /// Ledger CSV (default: <pdf-dir>/facility_information_metadata.csv)
        #[arg(long)]
        metadata_csv: Option<PathBuf>,
        /// Listing CSV used to fill in agency, title and date
        #[arg(long)]
        source_csv: Option<PathBuf>,
    },

    /// Check a ledger for missing files, missing checksums and duplicates
    Check {
        /// Ledger CSV to check
        #[arg(long)]
        metadata_csv: Option<PathBuf>,
        /// Download directory (ledger defaults to <dir>/facility_information_metadata.csv)
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
        /// Re-hash every file and compare with the recorded checksum
        #[arg(long)]
        verify: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, config) = load_settings_with_options(options).await?;
    let cwd = std::env::current_dir()?;
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    match cli.command {
        Commands::Discover {
            run_dir,
            save_individual_files,
            overwrite,
            remove_files,
        } => {
            discover::cmd_discover(
                &settings,
                &run_dir,
                save_individual_files,
                overwrite,
                remove_files,
            )
            .await
        }
        Commands::Fetch {
            document_id,
            csv,
            agency,
            title,
            date,
            download_dir,
            policy,
        } => {
            let download_dir = download_dir
                .or_else(|| config.download_dir(&base_dir))
                .unwrap_or_else(|| cwd.clone());
            let document = fetch::DocumentArgs {
                agency,
                title,
                date,
            };
            fetch::cmd_fetch(
                &settings,
                &document_id,
                csv.as_deref(),
                document,
                &download_dir,
                policy.unwrap_or(settings.filename_policy),
            )
            .await
        }
        Commands::Download {
            csv,
            download_dir,
            metadata_csv,
            no_skip,
            limit,
            sleep,
            policy,
            strict,
        } => {
            let options = download::DownloadOptions {
                metadata_csv,
                skip_existing: !no_skip,
                limit,
                sleep,
                policy: policy.unwrap_or(settings.filename_policy),
                strict,
            };
            download::cmd_download(&settings, &csv, &download_dir, options).await
        }
        Commands::Backfill {
            pdf_dir,
            metadata_csv,
            source_csv,
        } => {
            backfill::cmd_backfill(
                &settings,
                &pdf_dir,
                metadata_csv.as_deref(),
                source_csv.as_deref(),
            )
            .await
        }
        Commands::Check {
            metadata_csv,
            download_dir,
            verify,
        } => {
            let download_dir = download_dir.or_else(|| config.download_dir(&base_dir));
            check::cmd_check(&settings, metadata_csv, download_dir, verify).await
        }
    }
}
