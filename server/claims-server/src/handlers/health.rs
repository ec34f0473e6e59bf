use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: BTreeMap<String, String>,
}

/// Liveness and database reachability; unauthenticated
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();
    let mut healthy = true;

    match &state.db {
        Some(db) => {
            let ok = db.is_healthy().await;
            healthy &= ok;
            checks.insert(
                "database".to_string(),
                if ok { "healthy" } else { "unreachable" }.to_string(),
            );
        }
        None => {
            checks.insert("database".to_string(), "in_memory".to_string());
        }
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        checks,
    };
    (status, Json(body))
}
