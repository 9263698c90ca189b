//! Access-code issuing handlers.
//!
//! Master codes are minted by an operator holding the admin token; patient
//! codes are minted by psychologists for the patients they invite. Both kinds
//! are generated server side and inserted with a retry loop, so a rare
//! collision never surfaces to the caller.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        codes::{generate_master_code, generate_patient_code, MAX_GENERATION_ATTEMPTS},
        jwt::Claims,
    },
    error::{get_db_conn, is_unique_violation, storage_error, ApiError, ApiResult},
    helpers::ensure_own_resource,
    models::{MasterCode, NewMasterCode, NewPatientCode, PatientCode},
    schema::{master_codes, patient_codes},
    AppState,
};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Serialize, ToSchema)]
pub struct MasterCodeResponse {
    pub id: Uuid,
    #[schema(example = "AB12-CD34")]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CodeValidationResponse {
    pub valid: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IssuePatientCodeRequest {
    /// Optional address to invite; recorded in the logs only, delivery is
    /// handled out of band.
    #[serde(default)]
    #[schema(example = "paciente@exemplo.com")]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatientCodeResponse {
    pub id: Uuid,
    #[schema(example = "AB1-CD2")]
    pub code: String,
    pub issued_by: Uuid,
    pub redeemed: bool,
    /// Echo of the invite address, for the out-of-band delivery worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_email: Option<String>,
}

impl From<PatientCode> for PatientCodeResponse {
    fn from(code: PatientCode) -> Self {
        Self {
            id: code.id,
            code: code.code,
            issued_by: code.issued_by,
            redeemed: code.redeemed_by.is_some(),
            invite_email: None,
        }
    }
}

/// Mints a fresh master code. Gated by the operator admin token rather than a
/// session, since the operator is not a user of the system.
#[utoipa::path(
    post,
    path = "/codes/master",
    tag = "Códigos",
    responses(
        (status = 201, description = "Master code created", body = MasterCodeResponse),
        (status = 401, description = "Missing or wrong admin token", body = ApiError),
        (status = 503, description = "Admin token not configured", body = ApiError)
    )
)]
pub async fn create_master_code(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<MasterCodeResponse>)> {
    let expected = state.admin_token.as_deref().ok_or_else(|| {
        warn!("Master code requested but no admin token configured");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new("Emissão de códigos indisponível.")),
        )
    })?;

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Acesso negado."))?;

    if provided != expected {
        warn!("Master code request with wrong admin token");
        return Err(ApiError::unauthorized("Acesso negado."));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let created = insert_master_code_with_retry(&mut conn)?;

    info!(code_id = %created.id, "Master code issued");

    Ok((
        StatusCode::CREATED,
        Json(MasterCodeResponse {
            id: created.id,
            code: created.code,
        }),
    ))
}

/// Tells the registration screen whether a master code is still redeemable
/// without consuming it.
#[utoipa::path(
    get,
    path = "/codes/master/validate/{code}",
    tag = "Códigos",
    params(("code" = String, Path, description = "Master code to probe")),
    responses(
        (status = 200, description = "Validation result", body = CodeValidationResponse)
    )
)]
pub async fn validate_master_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<CodeValidationResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let valid = diesel::select(diesel::dsl::exists(
        master_codes::table
            .filter(master_codes::code.eq(code.trim().to_uppercase()))
            .filter(master_codes::redeemed_by.is_null()),
    ))
    .get_result(&mut conn)
    .map_err(|e| storage_error("validate master code", e))?;

    Ok(Json(CodeValidationResponse { valid }))
}

/// Issues a patient link code on behalf of a psychologist.
#[utoipa::path(
    post,
    path = "/codes/patient/{psychologist_id}",
    tag = "Códigos",
    params(("psychologist_id" = Uuid, Path, description = "Issuing psychologist")),
    request_body = IssuePatientCodeRequest,
    responses(
        (status = 201, description = "Patient code created", body = PatientCodeResponse),
        (status = 403, description = "Issuing for another account", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_patient_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(psychologist_id): Path<Uuid>,
    payload: Option<Json<IssuePatientCodeRequest>>,
) -> ApiResult<(StatusCode, Json<PatientCodeResponse>)> {
    ensure_own_resource(&claims, psychologist_id)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let created = insert_patient_code_with_retry(&mut conn, psychologist_id)?;

    let invite_email = payload.and_then(|Json(body)| body.email);
    match &invite_email {
        Some(email) => {
            info!(code_id = %created.id, invite_email = %email, "Patient code issued with invite")
        }
        None => info!(code_id = %created.id, "Patient code issued"),
    }

    let mut response = PatientCodeResponse::from(created);
    response.invite_email = invite_email;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Lists the codes a psychologist has issued, newest first.
#[utoipa::path(
    get,
    path = "/codes/patient/{psychologist_id}",
    tag = "Códigos",
    params(("psychologist_id" = Uuid, Path, description = "Issuing psychologist")),
    responses(
        (status = 200, description = "Issued codes", body = [PatientCodeResponse]),
        (status = 403, description = "Listing another account's codes", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_patient_codes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(psychologist_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PatientCodeResponse>>> {
    ensure_own_resource(&claims, psychologist_id)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let codes: Vec<PatientCode> = patient_codes::table
        .filter(patient_codes::issued_by.eq(psychologist_id))
        .order(patient_codes::created_at.desc())
        .select(PatientCode::as_select())
        .load(&mut conn)
        .map_err(|e| storage_error("list patient codes", e))?;

    Ok(Json(codes.into_iter().map(Into::into).collect()))
}

fn insert_patient_code_with_retry(
    conn: &mut PgConnection,
    issuer: Uuid,
) -> ApiResult<PatientCode> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = NewPatientCode {
            code: generate_patient_code(&mut rand::thread_rng()),
            issued_by: issuer,
        };
        match diesel::insert_into(patient_codes::table)
            .values(&candidate)
            .get_result::<PatientCode>(conn)
        {
            Ok(code) => return Ok(code),
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(storage_error("insert patient code", e)),
        }
    }

    error!(attempts = MAX_GENERATION_ATTEMPTS, "Patient code generation exhausted retries");
    Err(ApiError::internal(
        "Não foi possível gerar um código. Tente novamente.",
    ))
}

fn insert_master_code_with_retry(conn: &mut PgConnection) -> ApiResult<MasterCode> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = NewMasterCode {
            code: generate_master_code(&mut rand::thread_rng()),
        };
        match diesel::insert_into(master_codes::table)
            .values(&candidate)
            .get_result::<MasterCode>(conn)
        {
            Ok(code) => return Ok(code),
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(storage_error("insert master code", e)),
        }
    }

    error!(attempts = MAX_GENERATION_ATTEMPTS, "Master code generation exhausted retries");
    Err(ApiError::internal(
        "Não foi possível gerar um código. Tente novamente.",
    ))
}
