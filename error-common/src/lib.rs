//! Common error handling utilities for the SHA claims engine
//!
//! This crate holds the pieces every other crate agrees on:
//! - **PlatformError**: process-level failures (configuration, binding, startup)
//! - **Error codes**: stable machine-readable codes returned in API error bodies
//!
//! Domain crates keep their own `thiserror` enums; the server maps those onto
//! the codes defined here when it renders an error response.

pub mod codes;
pub mod types;

pub use types::*;
