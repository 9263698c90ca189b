//! Consultation note handlers. Notes are private to the psychologist who
//! wrote them and only attach to linked patients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, storage_error, ApiError, ApiResult},
    helpers::{ensure_own_resource, session_user_id},
    models::{ConsultationNote, NewConsultationNote},
    schema::{consultation_notes, patient_links},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConsultationNoteRequest {
    pub patient_id: Uuid,
    /// When the consultation happened; defaults to now.
    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
    #[schema(example = "Paciente relatou melhora no sono.")]
    pub note: String,
}

/// Records a consultation note about a linked patient.
#[utoipa::path(
    post,
    path = "/consultations",
    tag = "Consultas",
    request_body = CreateConsultationNoteRequest,
    responses(
        (status = 201, description = "Note recorded", body = ConsultationNote),
        (status = 404, description = "Patient not linked to the caller", body = ApiError),
        (status = 422, description = "Empty note", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateConsultationNoteRequest>,
) -> ApiResult<(StatusCode, Json<ConsultationNote>)> {
    let psychologist_id = session_user_id(&claims)?;

    let note = payload.note.trim().to_string();
    if note.is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let is_linked: bool = diesel::select(diesel::dsl::exists(
        patient_links::table
            .filter(patient_links::patient_id.eq(payload.patient_id))
            .filter(patient_links::psychologist_id.eq(psychologist_id)),
    ))
    .get_result(&mut conn)
    .map_err(|e| storage_error("check patient link", e))?;

    if !is_linked {
        return Err(ApiError::not_found("Paciente não vinculado."));
    }

    let created: ConsultationNote = diesel::insert_into(consultation_notes::table)
        .values(&NewConsultationNote {
            psychologist_id,
            patient_id: payload.patient_id,
            recorded_at: payload
                .recorded_at
                .unwrap_or_else(|| Utc::now().naive_utc()),
            note,
        })
        .get_result(&mut conn)
        .map_err(|e| storage_error("insert consultation note", e))?;

    info!(
        note_id = %created.id,
        patient_id = %created.patient_id,
        "Consultation note recorded"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// Lists a psychologist's notes about one patient, newest first.
#[utoipa::path(
    get,
    path = "/consultations/{psychologist_id}/{patient_id}",
    tag = "Consultas",
    params(
        ("psychologist_id" = Uuid, Path, description = "Note author"),
        ("patient_id" = Uuid, Path, description = "Patient the notes are about")
    ),
    responses(
        (status = 200, description = "Consultation notes", body = [ConsultationNote]),
        (status = 403, description = "Reading another psychologist's notes", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((psychologist_id, patient_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<ConsultationNote>>> {
    ensure_own_resource(&claims, psychologist_id)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let notes: Vec<ConsultationNote> = consultation_notes::table
        .filter(consultation_notes::psychologist_id.eq(psychologist_id))
        .filter(consultation_notes::patient_id.eq(patient_id))
        .order(consultation_notes::recorded_at.desc())
        .select(ConsultationNote::as_select())
        .load(&mut conn)
        .map_err(|e| storage_error("list consultation notes", e))?;

    Ok(Json(notes))
}
