//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Saúde",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatusResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
    #[schema(example = "1.0.0")]
    pub version: &'static str,
    #[schema(example = "ok")]
    pub database: &'static str,
}

/// Detailed status with the database probe folded in.
#[utoipa::path(
    get,
    path = "/health/status",
    tag = "Saúde",
    responses((status = 200, description = "Service status", body = HealthStatusResponse))
)]
pub async fn health_status(State(state): State<AppState>) -> Json<HealthStatusResponse> {
    let database = match state.db_pool.get() {
        Ok(mut conn) => {
            if diesel::sql_query("SELECT 1").execute(&mut conn).is_ok() {
                "ok"
            } else {
                "degraded"
            }
        }
        Err(_) => "degraded",
    };

    Json(HealthStatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

/// Readiness probe: checks out a connection and runs a trivial query.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Saúde",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let probe = state.db_pool.get().map_err(|e| {
        error!(error = %e, "Readiness probe could not get a connection");
        e.to_string()
    });

    let ready = match probe {
        Ok(mut conn) => diesel::sql_query("SELECT 1").execute(&mut conn).is_ok(),
        Err(_) => false,
    };

    if ready {
        Ok(Json(HealthResponse { status: "ok" }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
            }),
        ))
    }
}
