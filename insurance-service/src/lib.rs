//! SHA Submission Gateway
//!
//! Sends invoiced claims and claim batches to the national insurer and keeps
//! local state consistent with what the insurer accepted:
//! - **Insurer client**: the [`InsurerClient`] contract with a reqwest
//!   implementation and a scripted in-process double
//! - **Submission Gateway**: pending log before the call, bounded call,
//!   claim and invoice locked together on success
//! - **Reconciliation**: sweep resolving unconfirmed attempts and advancing
//!   submitted claims to their remote outcome

pub mod client;
pub mod error;
pub mod gateway;
pub mod models;
pub mod reconciliation;

pub use client::*;
pub use error::*;
pub use gateway::*;
pub use models::*;
pub use reconciliation::*;
