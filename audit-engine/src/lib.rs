//! Audit trail and domain events for the SHA claims engine
//!
//! Every state-changing action on a claim or invoice produces an
//! [`AuditEntry`]. Entries are immutable and append-only; the claims
//! repository writes them in the same transaction as the change they
//! describe, so the relational trail is always authoritative.
//!
//! Each entry carries a typed [`AuditDetails`] payload. The [`AuditAction`]
//! of an entry is derived from its payload, so an action can never be
//! paired with the wrong detail shape.
//!
//! Downstream consumers (analytics mirrors, notification fan-out) receive
//! [`DomainEvent`]s through a [`DomainEventPublisher`]. Publishing is
//! fire-and-forget: a failing subscriber never affects the claim workflow.
//!
//! # Example
//!
//! ```rust
//! use audit_engine::{AuditAction, AuditDetails, AuditEntry};
//! use uuid::Uuid;
//!
//! let entry = AuditEntry::new(
//!     Uuid::new_v4(),
//!     Uuid::new_v4(),
//!     AuditDetails::InvoicePrinted { invoice_number: "SHA-202406-000001".into() },
//! );
//! assert_eq!(entry.action, AuditAction::InvoicePrinted);
//! ```

pub mod entry;
pub mod error;
pub mod events;

pub use entry::*;
pub use error::*;
pub use events::*;
