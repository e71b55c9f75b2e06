//! REST API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::envelope::IdentityQuery;
use crate::error::RelayError;
use crate::relay::{AggregateResult, SoapRelay};

/// Shared handler state.
pub struct AppState {
    pub relay: SoapRelay,
}

/// Query string of `GET /api/fetch_data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchParams {
    pub dni: Option<String>,
    pub sexo: Option<String>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
}

// ==================== Error Handling ====================

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: msg.into() }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        if e.is_client_error() {
            ApiError::bad_request(e.to_string())
        } else {
            ApiError::internal(e.to_string())
        }
    }
}

// ==================== Handlers ====================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.relay.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upstream_calls: stats.upstream_calls,
        upstream_failures: stats.upstream_failures,
    })
}

/// `GET /api/fetch_data?dni=<id>&sexo=<code>`
pub async fn fetch_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchParams>,
) -> Result<Json<AggregateResult>, ApiError> {
    let query = IdentityQuery::new(params.dni, params.sexo)?;

    match state.relay.fetch(&query).await {
        Ok(result) => {
            info!("Identity lookup completed");
            Ok(Json(result))
        }
        Err(e) => {
            warn!(error = %e, "Identity lookup failed");
            Err(e.into())
        }
    }
}
