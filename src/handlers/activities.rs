//! Activity catalog handlers.
//!
//! Activities are the tags patients attach to diary entries. Any logged-in
//! user can read the catalog; only psychologists curate it. An activity that
//! already appears on an entry cannot be deleted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, is_unique_violation, storage_error, ApiError, ApiResult},
    helpers::session_user_id,
    models::{Activity, NewActivity},
    schema::{activities, diary_entry_activities},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivityRequest {
    #[schema(example = "Caminhada ao ar livre")]
    pub label: String,
}

#[utoipa::path(
    get,
    path = "/activities",
    tag = "Atividades",
    responses(
        (status = 200, description = "Activity catalog", body = [Activity]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_activities(State(state): State<AppState>) -> ApiResult<Json<Vec<Activity>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let catalog: Vec<Activity> = activities::table
        .order(activities::label.asc())
        .select(Activity::as_select())
        .load(&mut conn)
        .map_err(|e| storage_error("list activities", e))?;

    Ok(Json(catalog))
}

#[utoipa::path(
    post,
    path = "/activities",
    tag = "Atividades",
    request_body = ActivityRequest,
    responses(
        (status = 201, description = "Activity created", body = Activity),
        (status = 409, description = "Label already exists", body = ApiError),
        (status = 422, description = "Empty label", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ActivityRequest>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let user_id = session_user_id(&claims)?;

    let label = payload.label.trim().to_string();
    if label.is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let activity: Activity = diesel::insert_into(activities::table)
        .values(&NewActivity {
            label,
            created_by: user_id,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Atividade já cadastrada.")
            } else {
                storage_error("insert activity", e)
            }
        })?;

    info!(activity_id = %activity.id, "Activity created");

    Ok((StatusCode::CREATED, Json(activity)))
}

#[utoipa::path(
    put,
    path = "/activities/{activity_id}",
    tag = "Atividades",
    params(("activity_id" = Uuid, Path, description = "Activity to rename")),
    request_body = ActivityRequest,
    responses(
        (status = 200, description = "Activity updated", body = Activity),
        (status = 404, description = "Unknown activity", body = ApiError),
        (status = 409, description = "Label already exists", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Json(payload): Json<ActivityRequest>,
) -> ApiResult<Json<Activity>> {
    let label = payload.label.trim().to_string();
    if label.is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let activity: Activity = diesel::update(activities::table.find(activity_id))
        .set(activities::label.eq(label))
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::NotFound => {
                ApiError::not_found("Atividade não encontrada.")
            }
            e if is_unique_violation(&e) => ApiError::conflict("Atividade já cadastrada."),
            e => storage_error("update activity", e),
        })?;

    Ok(Json(activity))
}

#[utoipa::path(
    delete,
    path = "/activities/{activity_id}",
    tag = "Atividades",
    params(("activity_id" = Uuid, Path, description = "Activity to delete")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 404, description = "Unknown activity", body = ApiError),
        (status = 409, description = "Activity referenced by diary entries", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let in_use: bool = diesel::select(diesel::dsl::exists(
        diary_entry_activities::table.filter(diary_entry_activities::activity_id.eq(activity_id)),
    ))
    .get_result(&mut conn)
    .map_err(|e| storage_error("check activity usage", e))?;

    if in_use {
        return Err(ApiError::conflict(
            "Atividade em uso por entradas do diário.",
        ));
    }

    let deleted = diesel::delete(activities::table.find(activity_id))
        .execute(&mut conn)
        .map_err(|e| {
            // The usage check above races with a concurrent diary insert; the
            // foreign key still holds the line.
            if crate::error::is_foreign_key_violation(&e) {
                ApiError::conflict("Atividade em uso por entradas do diário.")
            } else {
                storage_error("delete activity", e)
            }
        })?;

    if deleted == 0 {
        return Err(ApiError::not_found("Atividade não encontrada."));
    }

    info!(activity_id = %activity_id, "Activity deleted");

    Ok(StatusCode::NO_CONTENT)
}
