//! Psychologist-side views over linked patients.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, storage_error, ApiError, ApiResult},
    helpers::ensure_own_resource,
    models::User,
    schema::{agenda_slots, diary_entries, patient_codes, patient_links, users},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkedPatientResponse {
    pub id: Uuid,
    #[schema(example = "ana")]
    pub username: String,
    #[schema(example = "ana@exemplo.com")]
    pub email: String,
    pub birth_date: NaiveDate,
    pub linked_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PsychologistStatsResponse {
    pub linked_patients: i64,
    pub pending_codes: i64,
    pub upcoming_booked_slots: i64,
    pub diary_entries_last_week: i64,
}

/// Lists the patients linked to a psychologist, oldest link first.
#[utoipa::path(
    get,
    path = "/psychologists/{psychologist_id}/patients",
    tag = "Pacientes",
    params(("psychologist_id" = Uuid, Path, description = "Psychologist account")),
    responses(
        (status = 200, description = "Linked patients", body = [LinkedPatientResponse]),
        (status = 403, description = "Listing another account's patients", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(psychologist_id): Path<Uuid>,
) -> ApiResult<Json<Vec<LinkedPatientResponse>>> {
    ensure_own_resource(&claims, psychologist_id)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let rows: Vec<(NaiveDateTime, User)> = patient_links::table
        .filter(patient_links::psychologist_id.eq(psychologist_id))
        .inner_join(users::table.on(users::id.eq(patient_links::patient_id)))
        .order(patient_links::created_at.asc())
        .select((patient_links::created_at, User::as_select()))
        .load(&mut conn)
        .map_err(|e| storage_error("list linked patients", e))?;

    Ok(Json(
        rows.into_iter()
            .map(|(linked_at, user)| LinkedPatientResponse {
                id: user.id,
                username: user.username,
                email: user.email,
                birth_date: user.birth_date,
                linked_at,
            })
            .collect(),
    ))
}

/// Dashboard counters for a psychologist's home screen.
#[utoipa::path(
    get,
    path = "/psychologists/{psychologist_id}/stats",
    tag = "Pacientes",
    params(("psychologist_id" = Uuid, Path, description = "Psychologist account")),
    responses(
        (status = 200, description = "Aggregate counters", body = PsychologistStatsResponse),
        (status = 403, description = "Reading another account's stats", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(psychologist_id): Path<Uuid>,
) -> ApiResult<Json<PsychologistStatsResponse>> {
    ensure_own_resource(&claims, psychologist_id)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let now = Utc::now().naive_utc();

    let linked_patients: i64 = patient_links::table
        .filter(patient_links::psychologist_id.eq(psychologist_id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| storage_error("count linked patients", e))?;

    let pending_codes: i64 = patient_codes::table
        .filter(patient_codes::issued_by.eq(psychologist_id))
        .filter(patient_codes::redeemed_by.is_null())
        .count()
        .get_result(&mut conn)
        .map_err(|e| storage_error("count pending codes", e))?;

    let upcoming_booked_slots: i64 = agenda_slots::table
        .filter(agenda_slots::psychologist_id.eq(psychologist_id))
        .filter(agenda_slots::patient_id.is_not_null())
        .filter(agenda_slots::starts_at.ge(now))
        .count()
        .get_result(&mut conn)
        .map_err(|e| storage_error("count booked slots", e))?;

    let week_ago = now - Duration::days(7);
    let diary_entries_last_week: i64 = diary_entries::table
        .inner_join(
            patient_links::table.on(patient_links::patient_id.eq(diary_entries::patient_id)),
        )
        .filter(patient_links::psychologist_id.eq(psychologist_id))
        .filter(diary_entries::recorded_at.ge(week_ago))
        .count()
        .get_result(&mut conn)
        .map_err(|e| storage_error("count recent diary entries", e))?;

    Ok(Json(PsychologistStatsResponse {
        linked_patients,
        pending_codes,
        upcoming_booked_slots,
        diary_entries_last_week,
    }))
}
