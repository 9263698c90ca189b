//! Authentication and role-gating middleware.
//!
//! The role check happens once here, at the routing boundary: patient-only
//! and psychologist-only route groups are layered with the matching guard
//! instead of re-checking the role inside every handler.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{auth::jwt::Claims, models::Role, AppState};

/// Validates the bearer token and stores the session claims in request
/// extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Sessão ausente. Faça login."})),
            )
                .into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Cabeçalho de autorização inválido."})),
        )
            .into_response()
    })?;

    let claims = state.jwt_config.verify_access_token(token).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Sessão inválida ou expirada."})),
        )
            .into_response()
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_psychologist(req: Request, next: Next) -> Result<Response, Response> {
    require_role(req, next, Role::Psychologist).await
}

pub async fn require_patient(req: Request, next: Next) -> Result<Response, Response> {
    require_role(req, next, Role::Patient).await
}

async fn require_role(req: Request, next: Next, role: Role) -> Result<Response, Response> {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.role == role => Ok(next.run(req).await),
        _ => Err((
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "Acesso negado."})),
        )
            .into_response()),
    }
}
