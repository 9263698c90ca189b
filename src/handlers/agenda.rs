//! Agenda slot handlers.
//!
//! Psychologists publish open slots; patients reserve them. Reservation is a
//! conditional update on `patient_id IS NULL`, so a double booking loses the
//! race at the database instead of overwriting.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, is_unique_violation, storage_error, ApiError, ApiResult},
    helpers::session_user_id,
    models::{AgendaSlot, NewAgendaSlot},
    schema::{agenda_slots, users},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSlotRequest {
    pub starts_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotResponse {
    pub id: Uuid,
    pub psychologist_id: Uuid,
    pub starts_at: NaiveDateTime,
    pub patient_id: Option<Uuid>,
    /// Present only in the owner's listing, for booked slots.
    #[schema(example = "ana")]
    pub patient_username: Option<String>,
}

impl From<AgendaSlot> for SlotResponse {
    fn from(slot: AgendaSlot) -> Self {
        Self {
            id: slot.id,
            psychologist_id: slot.psychologist_id,
            starts_at: slot.starts_at,
            patient_id: slot.patient_id,
            patient_username: None,
        }
    }
}

/// Publishes an open slot in the calling psychologist's agenda.
#[utoipa::path(
    post,
    path = "/agenda/slots",
    tag = "Agenda",
    request_body = CreateSlotRequest,
    responses(
        (status = 201, description = "Slot published", body = AgendaSlot),
        (status = 409, description = "Slot already exists at that time", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_slot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSlotRequest>,
) -> ApiResult<(StatusCode, Json<AgendaSlot>)> {
    let psychologist_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let slot: AgendaSlot = diesel::insert_into(agenda_slots::table)
        .values(&NewAgendaSlot {
            psychologist_id,
            starts_at: payload.starts_at,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Já existe um horário nesse momento.")
            } else {
                storage_error("insert agenda slot", e)
            }
        })?;

    info!(slot_id = %slot.id, starts_at = %slot.starts_at, "Agenda slot published");

    Ok((StatusCode::CREATED, Json(slot)))
}

/// Lists a psychologist's agenda. The owner sees every slot; anyone else sees
/// only free future slots, soonest first.
#[utoipa::path(
    get,
    path = "/agenda/psychologist/{psychologist_id}",
    tag = "Agenda",
    params(("psychologist_id" = Uuid, Path, description = "Agenda owner")),
    responses(
        (status = 200, description = "Agenda slots", body = [SlotResponse]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_slots(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(psychologist_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SlotResponse>>> {
    let caller_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    if caller_id == psychologist_id {
        let rows: Vec<(AgendaSlot, Option<String>)> = agenda_slots::table
            .filter(agenda_slots::psychologist_id.eq(psychologist_id))
            .left_join(users::table.on(users::id.nullable().eq(agenda_slots::patient_id)))
            .order(agenda_slots::starts_at.asc())
            .select((AgendaSlot::as_select(), users::username.nullable()))
            .load(&mut conn)
            .map_err(|e| storage_error("list agenda slots", e))?;

        return Ok(Json(
            rows.into_iter()
                .map(|(slot, patient_username)| SlotResponse {
                    patient_username,
                    ..slot.into()
                })
                .collect(),
        ));
    }

    let slots: Vec<AgendaSlot> = agenda_slots::table
        .filter(agenda_slots::psychologist_id.eq(psychologist_id))
        .filter(agenda_slots::patient_id.is_null())
        .filter(agenda_slots::starts_at.ge(Utc::now().naive_utc()))
        .order(agenda_slots::starts_at.asc())
        .select(AgendaSlot::as_select())
        .load(&mut conn)
        .map_err(|e| storage_error("list agenda slots", e))?;

    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// Reserves a free slot for the calling patient.
#[utoipa::path(
    put,
    path = "/agenda/slots/{slot_id}/reserve",
    tag = "Agenda",
    params(("slot_id" = Uuid, Path, description = "Slot to reserve")),
    responses(
        (status = 200, description = "Slot reserved", body = AgendaSlot),
        (status = 404, description = "Unknown slot", body = ApiError),
        (status = 409, description = "Slot no longer free", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reserve_slot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<Json<AgendaSlot>> {
    let patient_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let reserved: Option<AgendaSlot> = diesel::update(
        agenda_slots::table
            .find(slot_id)
            .filter(agenda_slots::patient_id.is_null()),
    )
    .set(agenda_slots::patient_id.eq(patient_id))
    .get_result(&mut conn)
    .optional()
    .map_err(|e| storage_error("reserve agenda slot", e))?;

    match reserved {
        Some(slot) => {
            info!(slot_id = %slot.id, patient_id = %patient_id, "Agenda slot reserved");
            Ok(Json(slot))
        }
        None => {
            // Zero rows is either a missing slot or a lost race; tell them
            // apart for the caller.
            let exists: bool = diesel::select(diesel::dsl::exists(
                agenda_slots::table.find(slot_id),
            ))
            .get_result(&mut conn)
            .map_err(|e| storage_error("check agenda slot", e))?;

            if exists {
                warn!(slot_id = %slot_id, "Reservation lost the race");
                Err(ApiError::conflict("Horário não está mais disponível."))
            } else {
                Err(ApiError::not_found("Horário não encontrado."))
            }
        }
    }
}

/// Deletes a slot from the calling psychologist's own agenda.
#[utoipa::path(
    delete,
    path = "/agenda/slots/{slot_id}",
    tag = "Agenda",
    params(("slot_id" = Uuid, Path, description = "Slot to delete")),
    responses(
        (status = 204, description = "Slot deleted"),
        (status = 404, description = "Unknown slot or not the owner", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_slot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let psychologist_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(
        agenda_slots::table
            .find(slot_id)
            .filter(agenda_slots::psychologist_id.eq(psychologist_id)),
    )
    .execute(&mut conn)
    .map_err(|e| storage_error("delete agenda slot", e))?;

    if deleted == 0 {
        return Err(ApiError::not_found("Horário não encontrado."));
    }

    info!(slot_id = %slot_id, "Agenda slot deleted");

    Ok(StatusCode::NO_CONTENT)
}
