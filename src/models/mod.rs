//! Data models for licacquire.

mod agency;
mod document;

pub use agency::{Agency, DocumentListing, AGENCY_COLUMNS, LISTING_COLUMNS};
pub use document::{columns, DocumentRecord, DownloadStatus, LEDGER_EXTRA_COLUMNS};
