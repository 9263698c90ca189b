//! Patient/psychologist linking handlers.
//!
//! A patient redeems a one-time code to create the link; each patient holds at
//! most one link, enforced both by an upfront check and by the unique index on
//! the link table. Redemption and link creation commit in one transaction.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, storage_error, violated_constraint, ApiError, ApiResult},
    helpers::session_user_id,
    models::{NewPatientLink, PatientLink, User},
    schema::{patient_codes, patient_links, users},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemCodeRequest {
    #[schema(example = "AB1-CD2")]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkResponse {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub psychologist_id: Uuid,
    pub linked_at: NaiveDateTime,
}

impl From<PatientLink> for LinkResponse {
    fn from(link: PatientLink) -> Self {
        Self {
            id: link.id,
            patient_id: link.patient_id,
            psychologist_id: link.psychologist_id,
            linked_at: link.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkedPsychologistResponse {
    pub psychologist: Option<PsychologistSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PsychologistSummary {
    pub id: Uuid,
    #[schema(example = "dr_helena")]
    pub username: String,
    #[schema(example = "helena@exemplo.com")]
    pub email: String,
    pub linked_at: NaiveDateTime,
}

enum RedeemFailure {
    InvalidCode,
    AlreadyLinked,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for RedeemFailure {
    fn from(e: diesel::result::Error) -> Self {
        match violated_constraint(&e) {
            Some(name) if name.contains("patient_id") => Self::AlreadyLinked,
            _ => Self::Db(e),
        }
    }
}

/// Redeems a patient code and links the calling patient to its issuer.
#[utoipa::path(
    post,
    path = "/link",
    tag = "Vínculo",
    request_body = RedeemCodeRequest,
    responses(
        (status = 201, description = "Link created", body = LinkResponse),
        (status = 409, description = "Patient already linked", body = ApiError),
        (status = 422, description = "Invalid or already used code", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn redeem_patient_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RedeemCodeRequest>,
) -> ApiResult<(StatusCode, Json<LinkResponse>)> {
    let patient_id = session_user_id(&claims)?;

    let code = payload.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let result = conn.transaction::<PatientLink, RedeemFailure, _>(|conn| {
        let already_linked: bool = diesel::select(diesel::dsl::exists(
            patient_links::table.filter(patient_links::patient_id.eq(patient_id)),
        ))
        .get_result(conn)?;
        if already_linked {
            return Err(RedeemFailure::AlreadyLinked);
        }

        // Claiming the code is a conditional update; of two concurrent
        // redemptions exactly one sees a row change.
        let issuer: Option<Uuid> = patient_codes::table
            .filter(patient_codes::code.eq(&code))
            .filter(patient_codes::redeemed_by.is_null())
            .select(patient_codes::issued_by)
            .first(conn)
            .optional()?;
        let issuer = issuer.ok_or(RedeemFailure::InvalidCode)?;

        let claimed = diesel::update(
            patient_codes::table
                .filter(patient_codes::code.eq(&code))
                .filter(patient_codes::redeemed_by.is_null()),
        )
        .set(patient_codes::redeemed_by.eq(patient_id))
        .execute(conn)?;
        if claimed == 0 {
            return Err(RedeemFailure::InvalidCode);
        }

        let link: PatientLink = diesel::insert_into(patient_links::table)
            .values(&NewPatientLink {
                patient_id,
                psychologist_id: issuer,
            })
            .get_result(conn)?;

        Ok(link)
    });

    let link = result.map_err(|e| match e {
        RedeemFailure::InvalidCode => {
            warn!(patient_id = %patient_id, "Redemption with invalid or used patient code");
            ApiError::validation("Código inválido ou já utilizado.")
        }
        RedeemFailure::AlreadyLinked => {
            ApiError::conflict("Você já está vinculado a um psicólogo.")
        }
        RedeemFailure::Db(e) => {
            error!(error = %e, "Failed to redeem patient code");
            ApiError::storage()
        }
    })?;

    info!(
        patient_id = %link.patient_id,
        psychologist_id = %link.psychologist_id,
        "Patient linked"
    );

    Ok((StatusCode::CREATED, Json(link.into())))
}

/// Returns the psychologist the calling patient is linked to, or null.
#[utoipa::path(
    get,
    path = "/link",
    tag = "Vínculo",
    responses(
        (status = 200, description = "Current link", body = LinkedPsychologistResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<LinkedPsychologistResponse>> {
    let patient_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let row: Option<(NaiveDateTime, User)> = patient_links::table
        .filter(patient_links::patient_id.eq(patient_id))
        .inner_join(users::table.on(users::id.eq(patient_links::psychologist_id)))
        .select((patient_links::created_at, User::as_select()))
        .first(&mut conn)
        .optional()
        .map_err(|e| storage_error("load patient link", e))?;

    Ok(Json(LinkedPsychologistResponse {
        psychologist: row.map(|(linked_at, user)| PsychologistSummary {
            id: user.id,
            username: user.username,
            email: user.email,
            linked_at,
        }),
    }))
}
