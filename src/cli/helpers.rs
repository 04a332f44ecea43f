//! Shared helper functions for CLI commands.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::error::ConfigurationError;
use crate::ledger::CsvTable;
use crate::models::columns;
use crate::scrapers::{HttpClient, LicensingClient};

/// Build the upstream client from settings, optionally overriding the delay.
pub fn build_client(
    settings: &Settings,
    request_delay: Option<Duration>,
) -> anyhow::Result<LicensingClient> {
    let http = HttpClient::with_user_agent(
        settings.request_timeout(),
        request_delay.unwrap_or_else(|| settings.request_delay()),
        settings.user_agent.as_deref(),
        settings.accept_invalid_certs,
    )
    .context("failed to build HTTP client")?;

    Ok(LicensingClient::new(
        http,
        &settings.base_url,
        settings.content_endpoint,
    ))
}

/// Read a listing CSV that must exist and carry a `ContentDocumentId` column.
pub fn read_listing(path: &Path) -> anyhow::Result<CsvTable> {
    if !path.is_file() {
        return Err(ConfigurationError::MissingInput(path.to_path_buf()).into());
    }
    let table = CsvTable::read(path)?;
    table.require_column(path, columns::DOCUMENT_ID)?;
    Ok(table)
}

/// Fail unless `path` is an existing directory.
pub fn require_dir(path: &Path) -> Result<(), ConfigurationError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigurationError::MissingDirectory(path.to_path_buf()))
    }
}

/// Progress bar used by the batch commands.
pub fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_listing_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_listing(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::MissingInput(_))
        ));
    }

    #[test]
    fn test_read_listing_requires_id_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("listing.csv");
        std::fs::write(&path, "Title,CreatedDate\nInspection,2025-01-02\n").unwrap();
        let err = read_listing(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_require_dir() {
        let dir = tempdir().unwrap();
        assert!(require_dir(dir.path()).is_ok());
        assert!(require_dir(&dir.path().join("nope")).is_err());
    }
}
