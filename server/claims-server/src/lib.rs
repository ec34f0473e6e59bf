//! SHA claims engine HTTP server
//!
//! Axum surface over the claims, submission and workflow crates:
//! - **Configuration**: layered defaults, file and environment ([`config`])
//! - **Authentication**: HS256 bearer tokens with clinic role gates ([`middleware`])
//! - **Error envelope**: every failure renders `{success: false, message, error, error_id}`
//!   with a status derived from the domain error ([`error`])
//! - **Background work**: the binary also runs the reconciliation timer and the
//!   workflow automation worker
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use claims_server::{create_app, AppConfig, AppState, Backends};
//! use insurance_service::ScriptedInsurerClient;
//!
//! # fn build() -> Result<(), error_common::PlatformError> {
//! let config = AppConfig::from_defaults()?;
//! let backends = Backends::in_memory(Arc::new(ScriptedInsurerClient::new()));
//! let app = create_app(AppState::new(&config, backends, None));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::AppConfig;
pub use error::{ApiError, ApiResponse};
pub use server::{AppState, Backends};

/// Build the application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .nest(routes::paths::API_V1, routes::api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
