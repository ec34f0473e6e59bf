//! Database layer for the SHA claims engine
//!
//! Provides the shared Postgres plumbing used by the claims and workflow
//! repositories:
//! - **Connection management**: a pooled `DatabasePool` with health checks
//! - **Error classification**: unique-constraint violations are surfaced with
//!   their constraint name so repositories can translate them into business
//!   errors (duplicate invoice, submission already in flight, ...)
//! - **Text enums**: `text_enum!` gives domain enums a stable `TEXT` column
//!   representation
//! - **Migrations**: the schema under `migrations/` is embedded at compile time
//!
//! # Example
//!
//! ```rust,no_run
//! use database_layer::{run_migrations, DatabasePool, PoolSettings};
//!
//! # async fn boot() -> database_layer::DatabaseResult<()> {
//! let settings = PoolSettings { max_connections: 20, ..PoolSettings::default() };
//! let db = DatabasePool::connect_with("postgresql://localhost/sha_claims", &settings).await?;
//! run_migrations(db.pool()).await?;
//! assert!(db.is_healthy().await);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod macros;
pub mod migration;

pub use connection::*;
pub use error::*;
pub use migration::*;
