//! Shared helper functions for handlers.

use axum::{http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::error::ApiError;

pub fn session_user_id(claims: &Claims) -> Result<Uuid, (StatusCode, Json<ApiError>)> {
    claims
        .user_id()
        .map_err(|_| ApiError::unauthorized("Sessão inválida ou expirada."))
}

/// Routes like `/psychologists/{id}/patients` keep the id in the path for
/// caller symmetry, but the id must match the session.
pub fn ensure_own_resource(
    claims: &Claims,
    path_id: Uuid,
) -> Result<Uuid, (StatusCode, Json<ApiError>)> {
    let user_id = session_user_id(claims)?;
    if user_id != path_id {
        return Err(ApiError::forbidden("Acesso negado."));
    }
    Ok(user_id)
}
