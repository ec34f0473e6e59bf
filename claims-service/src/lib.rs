//! SHA claims domain: claim store, pre-submission invoices and batching
//!
//! This crate owns the claim and invoice state machines:
//! - **Claim Store**: claim creation with line items, status transitions,
//!   filtered listing
//! - **Invoice Generator**: exactly one open invoice per claim, generated
//!   before submission and locked once the claim is submitted
//! - **Batch Manager**: grouping ready claims for bulk submission
//! - **Compliance checks**: per-claim checklist and period reports
//! - **Exports**: portal claims CSV and batch reports
//!
//! Persistence goes through the [`ClaimsRepository`] trait. Every multi-row
//! effect (claim + items, invoice + claim + audit, batch + claim assignment,
//! submission outcome) is a single repository call, which the Postgres
//! implementation runs in one transaction. The in-memory implementation
//! gives the same guarantees under a single lock and backs the test suites.

pub mod batches;
pub mod claims;
pub mod compliance;
pub mod error;
pub mod exports;
pub mod invoices;
pub mod models;
pub mod numbering;
pub mod repository;
pub mod validation;

pub use batches::*;
pub use claims::*;
pub use compliance::*;
pub use error::*;
pub use exports::*;
pub use invoices::*;
pub use models::*;
pub use repository::*;
