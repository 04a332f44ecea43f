//! Service layer for licacquire business logic.
//!
//! This module contains domain logic separated from UI concerns.
//! Services report progress through event channels; the CLI renders them.

pub mod audit;
pub mod backfill;
pub mod discovery;
pub mod fetch;
pub mod reconcile;

pub use audit::{audit_ledger, AuditReport};
pub use backfill::{BackfillService, BackfillSummary};
pub use discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryResult, DiscoveryService};
pub use fetch::{fetch_verified, FetchOutcome};
pub use reconcile::{
    MismatchPolicy, ReconcileConfig, ReconcileEvent, ReconcileMode, ReconcileService,
    ReconcileSummary,
};
