//! Agency and document discovery.
//!
//! Pulls the agency list, then each agency's content listing, and writes a
//! dated set of files into a run directory. The combined listing CSV is the
//! input to `download`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{DiscoveryError, LedgerError};
use crate::ledger::{write_bytes_atomic, write_csv_atomic};
use crate::models::{Agency, DocumentListing, AGENCY_COLUMNS, LISTING_COLUMNS};
use crate::naming::{generate_filename, FilenamePolicy};
use crate::scrapers::LicensingClient;

/// Columns of the per-agency listing CSV.
const AGENCY_LISTING_COLUMNS: [&str; 7] = [
    "agency_id",
    "FileExtension",
    "CreatedDate",
    "Title",
    "ContentBodyId",
    "Id",
    "ContentDocumentId",
];

/// Configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub run_dir: PathBuf,
    /// `YYYY-MM-DD` prefix for the dated output files.
    pub date: String,
    /// Keep `<agency>_pdf_content_details.{json,csv}` files.
    pub save_individual_files: bool,
    /// Re-query agencies whose individual CSV already exists.
    pub overwrite_individual_files: bool,
    /// Delete individual files once the combined CSV is written.
    pub remove_individual_files: bool,
}

/// Events emitted during discovery.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Agency list retrieved
    AgenciesListed { total: usize },
    /// Agency listing merged; `reused` when read back from an individual file
    AgencyCompleted {
        agency_id: String,
        documents: usize,
        reused: bool,
    },
    /// Agency listing failed and was skipped
    AgencyFailed { agency_id: String, error: String },
}

/// Result of a discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub agencies: usize,
    pub agencies_failed: usize,
    pub documents: usize,
    /// Documents whose date prevented filename generation.
    pub invalid_dates: usize,
    pub agency_json: PathBuf,
    pub agency_csv: PathBuf,
    pub combined_csv: PathBuf,
}

/// Service for the discovery pass.
pub struct DiscoveryService {
    client: LicensingClient,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(client: LicensingClient, config: DiscoveryConfig) -> Self {
        Self { client, config }
    }

    fn run_path(&self, name: String) -> PathBuf {
        self.config.run_dir.join(name)
    }

    /// Run discovery and write all output files.
    pub async fn run(
        &self,
        event_tx: mpsc::Sender<DiscoveryEvent>,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let config = &self.config;
        fs::create_dir_all(&config.run_dir).map_err(|source| DiscoveryError::Io {
            path: config.run_dir.clone(),
            source,
        })?;

        let directory = self
            .client
            .agencies()
            .await
            .map_err(DiscoveryError::AgencyList)?;
        tracing::info!("Retrieved {} agencies", directory.agencies.len());
        let _ = event_tx
            .send(DiscoveryEvent::AgenciesListed {
                total: directory.agencies.len(),
            })
            .await;

        let agency_json = self.run_path(format!("{}_all_agency_info.json", config.date));
        write_json(&agency_json, &directory.response)?;

        let agency_csv = self.run_path(format!("{}_agency_info.csv", config.date));
        write_csv_atomic(
            &agency_csv,
            &header(&AGENCY_COLUMNS),
            directory.agencies.iter().map(Agency::csv_row),
        )?;

        let mut result = DiscoveryResult {
            agencies: directory.agencies.len(),
            ..Default::default()
        };
        let mut combined = Vec::new();
        let mut individual_files = Vec::new();

        for agency in &directory.agencies {
            let Some(agency_id) = agency.agency_id() else {
                tracing::warn!("Skipping agency with empty agencyId");
                continue;
            };
            let agency_name = agency.name();
            let csv_path = self.run_path(format!("{}_pdf_content_details.csv", agency_id));
            let json_path = self.run_path(format!("{}_pdf_content_details.json", agency_id));

            if config.save_individual_files && !config.overwrite_individual_files && csv_path.exists() {
                match read_agency_listing(&csv_path, &agency_name) {
                    Ok(listings) => {
                        tracing::info!(
                            "Reusing {} ({} documents)",
                            csv_path.display(),
                            listings.len()
                        );
                        let _ = event_tx
                            .send(DiscoveryEvent::AgencyCompleted {
                                agency_id: agency_id.clone(),
                                documents: listings.len(),
                                reused: true,
                            })
                            .await;
                        combined.extend(listings);
                        individual_files.push(csv_path);
                        individual_files.push(json_path);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Could not reuse {}: {}; re-querying", csv_path.display(), e);
                    }
                }
            }

            let details = match self.client.content_details(&agency_id).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!("Failed to retrieve content details for {}: {}", agency_id, e);
                    result.agencies_failed += 1;
                    let _ = event_tx
                        .send(DiscoveryEvent::AgencyFailed {
                            agency_id: agency_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            let listings: Vec<DocumentListing> = details
                .entries
                .iter()
                .map(|entry| DocumentListing::from_json(&agency_id, &agency_name, entry))
                .collect();

            if config.save_individual_files {
                write_json(&json_path, &details.response)?;
                write_csv_atomic(
                    &csv_path,
                    &header(&AGENCY_LISTING_COLUMNS),
                    listings.iter().map(agency_listing_row),
                )?;
                individual_files.push(csv_path);
                individual_files.push(json_path);
            }

            let _ = event_tx
                .send(DiscoveryEvent::AgencyCompleted {
                    agency_id: agency_id.clone(),
                    documents: listings.len(),
                    reused: false,
                })
                .await;
            combined.extend(listings);
        }

        for listing in &mut combined {
            match generate_filename(
                FilenamePolicy::Rich,
                &listing.content_document_id,
                Some(&listing.agency_name),
                Some(&listing.title),
                Some(&listing.created_date),
                None,
            ) {
                Ok(name) => listing.generated_filename = name,
                Err(e) => {
                    tracing::warn!(
                        "No filename for {} ({}): {}",
                        listing.content_document_id,
                        listing.agency_id,
                        e
                    );
                    result.invalid_dates += 1;
                }
            }
        }

        let combined_csv = self.run_path(format!("{}_combined_pdf_content_details.csv", config.date));
        write_csv_atomic(
            &combined_csv,
            &header(&LISTING_COLUMNS),
            combined.iter().map(DocumentListing::csv_row),
        )?;
        tracing::info!(
            "Combined listing of {} documents written to {}",
            combined.len(),
            combined_csv.display()
        );

        if config.remove_individual_files && config.save_individual_files {
            for path in individual_files {
                if path.exists() {
                    fs::remove_file(&path).map_err(|source| DiscoveryError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    tracing::debug!("Removed {}", path.display());
                }
            }
        }

        result.documents = combined.len();
        result.agency_json = agency_json;
        result.agency_csv = agency_csv;
        result.combined_csv = combined_csv;
        Ok(result)
    }
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn agency_listing_row(listing: &DocumentListing) -> Vec<String> {
    vec![
        listing.agency_id.clone(),
        listing.file_extension.clone(),
        listing.created_date.clone(),
        listing.title.clone(),
        listing.content_body_id.clone(),
        listing.id.clone(),
        listing.content_document_id.clone(),
    ]
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DiscoveryError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| DiscoveryError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, &bytes).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a per-agency listing CSV back into listings.
fn read_agency_listing(path: &Path, agency_name: &str) -> Result<Vec<DocumentListing>, LedgerError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| LedgerError::csv(path, e))?;
    let mut listings = Vec::new();
    for row in reader.deserialize::<DocumentListing>() {
        let mut listing = row.map_err(|e| LedgerError::csv(path, e))?;
        listing.agency_name = agency_name.to_string();
        listings.push(listing);
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_agency_listing_fills_agency_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("A1_pdf_content_details.csv");
        let listing = DocumentListing {
            agency_id: "A1".to_string(),
            title: "Inspection".to_string(),
            created_date: "2025-07-18".to_string(),
            content_document_id: "069cs0000104BR0AAM".to_string(),
            ..Default::default()
        };
        write_csv_atomic(
            &path,
            &header(&AGENCY_LISTING_COLUMNS),
            [agency_listing_row(&listing)],
        )
        .unwrap();

        let back = read_agency_listing(&path, "Glen's House").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].agency_name, "Glen's House");
        assert_eq!(back[0].content_document_id, "069cs0000104BR0AAM");
        assert_eq!(back[0].generated_filename, "");
    }

    #[test]
    fn test_write_json_is_pretty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &serde_json::json!({"a": [1, 2]})).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
    }
}
