//! Shared error handling utilities.
//!
//! Every failure leaves the service as a `{ "detail": <message> }` body with a
//! status code from a fixed mapping: 422 validation, 401 credentials, 403 role,
//! 404 not-found, 409 conflict, 500 storage. Raw database messages are logged
//! but never returned to callers.

use axum::{http::StatusCode, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Usuário ou senha inválidos.")]
    pub detail: String,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::UNPROCESSABLE_ENTITY, Json(Self::new(detail)))
    }

    pub fn unauthorized(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(detail)))
    }

    pub fn forbidden(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(detail)))
    }

    pub fn not_found(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(detail)))
    }

    pub fn conflict(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(detail)))
    }

    pub fn internal(detail: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(Self::new(detail)))
    }

    pub fn storage() -> (StatusCode, Json<Self>) {
        Self::internal("Erro interno. Tente novamente.")
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn get_db_conn(
    pool: &DbPool,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    (StatusCode, Json<ApiError>),
> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::storage()
    })
}

/// Logs the underlying diesel error and maps it to the generic storage body.
pub fn storage_error(context: &'static str, e: DieselError) -> (StatusCode, Json<ApiError>) {
    error!(error = %e, context, "Storage error");
    ApiError::storage()
}

pub fn is_unique_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

pub fn is_foreign_key_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)
    )
}

/// Name of the violated constraint for a unique-violation error, if the
/// backend reported one.
pub fn violated_constraint(e: &DieselError) -> Option<&str> {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            info.constraint_name()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("x").0, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::unauthorized("x").0, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").0, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").0, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").0, StatusCode::CONFLICT);
        assert_eq!(ApiError::storage().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_detail_body() {
        let (_, body) = ApiError::conflict("Horário não está mais disponível.");
        let json = serde_json::to_value(&body.0).unwrap();
        assert_eq!(
            json["detail"].as_str().unwrap(),
            "Horário não está mais disponível."
        );
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(!is_unique_violation(&DieselError::NotFound));
        assert!(!is_foreign_key_violation(&DieselError::NotFound));
        assert!(violated_constraint(&DieselError::NotFound).is_none());
    }
}
