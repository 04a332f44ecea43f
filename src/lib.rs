//! Licensing-search document acquisition with a checksum-keyed download ledger.
//!
//! The crate discovers agency document listings, fetches each document with
//! integrity verification, and reconciles the results into a CSV ledger that
//! is safe to re-run against.

pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod naming;
pub mod scrapers;
pub mod services;
pub mod utils;
