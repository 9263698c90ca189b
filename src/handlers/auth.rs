//! Registration and login handlers.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    auth::{jwt::Claims, password::PasswordService},
    error::{get_db_conn, storage_error, violated_constraint, ApiError, ApiResult},
    helpers::session_user_id,
    models::{NewUser, Role, User},
    schema::{master_codes, users},
    AppState,
};

pub const BIRTH_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Preencha todos os campos obrigatórios."))]
    #[schema(example = "ana")]
    pub username: String,
    #[schema(example = "senha-segura-123")]
    pub password: String,
    #[validate(email(message = "E-mail inválido."))]
    #[schema(example = "ana@exemplo.com")]
    pub email: String,
    /// Birth date as DD/MM/YYYY, the format the mobile client submits.
    #[schema(example = "01/01/2000")]
    pub birth_date: String,
    /// Optional master code; a valid unredeemed code registers a
    /// psychologist, absence registers a patient.
    #[serde(default)]
    #[schema(example = "AB12-CD34")]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "E-mail inválido."))]
    #[schema(example = "ana@exemplo.com")]
    pub email: String,
    #[schema(example = "senha-segura-123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "ana")]
    pub username: String,
    #[schema(example = "ana@exemplo.com")]
    pub email: String,
    pub role: Role,
    pub birth_date: NaiveDate,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            birth_date: user.birth_date,
            created_at: user.created_at,
        }
    }
}

/// Register outcomes that must roll the whole transaction back.
enum RegisterFailure {
    InvalidCode,
    DuplicateUsername,
    DuplicateEmail,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for RegisterFailure {
    fn from(e: diesel::result::Error) -> Self {
        match violated_constraint(&e) {
            Some(name) if name.contains("username") => Self::DuplicateUsername,
            Some(name) if name.contains("email") => Self::DuplicateEmail,
            _ => Self::Db(e),
        }
    }
}

fn first_validation_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|field| field.iter())
        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .next()
        .unwrap_or_else(|| "Dados inválidos.".to_string())
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Contas",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 422, description = "Invalid field or access code", body = ApiError),
        (status = 409, description = "Username or email already registered", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::validation(first_validation_message(&e)));
    }

    if payload.username.trim().is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    if payload.password.len() < state.min_password_length {
        return Err(ApiError::validation(format!(
            "A senha deve ter pelo menos {} caracteres.",
            state.min_password_length
        )));
    }

    let birth_date = NaiveDate::parse_from_str(&payload.birth_date, BIRTH_DATE_FORMAT)
        .map_err(|_| ApiError::validation("Data de nascimento inválida."))?;

    let code = payload
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_uppercase);

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Erro interno. Tente novamente.")
            })?;

    let username = payload.username.trim().to_string();
    let email = payload.email.to_lowercase();

    let mut conn = get_db_conn(&state.db_pool)?;

    // User creation and master-code redemption commit together: a lost
    // redemption race rolls the new account back too.
    let result = conn.transaction::<User, RegisterFailure, _>(|conn| {
        let master_code_id = match code.as_deref() {
            Some(c) => {
                let id: Option<Uuid> = master_codes::table
                    .filter(master_codes::code.eq(c))
                    .filter(master_codes::redeemed_by.is_null())
                    .select(master_codes::id)
                    .first(conn)
                    .optional()?;
                Some(id.ok_or(RegisterFailure::InvalidCode)?)
            }
            None => None,
        };

        let role = if master_code_id.is_some() {
            Role::Psychologist
        } else {
            Role::Patient
        };

        let user: User = diesel::insert_into(users::table)
            .values(&NewUser {
                username: username.clone(),
                email: email.clone(),
                password_hash: password_hash.clone(),
                role,
                birth_date,
            })
            .get_result(conn)?;

        if let Some(code_id) = master_code_id {
            let claimed = diesel::update(
                master_codes::table
                    .filter(master_codes::id.eq(code_id))
                    .filter(master_codes::redeemed_by.is_null()),
            )
            .set(master_codes::redeemed_by.eq(user.id))
            .execute(conn)?;

            // Zero rows means a concurrent registration claimed it first.
            if claimed == 0 {
                return Err(RegisterFailure::InvalidCode);
            }
        }

        Ok(user)
    });

    let user = result.map_err(|e| match e {
        RegisterFailure::InvalidCode => {
            warn!(email = %email, "Registration with invalid or used master code");
            ApiError::validation("Código de Acesso inválido.")
        }
        RegisterFailure::DuplicateUsername => {
            ApiError::conflict("Nome de usuário já cadastrado.")
        }
        RegisterFailure::DuplicateEmail => ApiError::conflict("E-mail já cadastrado."),
        RegisterFailure::Db(e) => {
            error!(error = %e, "Failed to register user");
            ApiError::storage()
        }
    })?;

    let access_token = state
        .jwt_config
        .generate_access_token(user.id, &user.username, user.role)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Erro interno. Tente novamente.")
        })?;

    info!(user_id = %user.id, role = %user.role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            access_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Contas",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Unknown email or wrong password", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    // Same message for unknown email and wrong password, so callers cannot
    // enumerate accounts. Store failures stay 500.
    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .first(&mut conn)
        .optional()
        .map_err(|e| storage_error("load user for login", e))?;

    let user = user.ok_or_else(|| {
        warn!(email = %payload.email, "Login attempt for non-existent user");
        ApiError::unauthorized("Usuário ou senha inválidos.")
    })?;

    let is_valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Erro interno. Tente novamente.")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        return Err(ApiError::unauthorized("Usuário ou senha inválidos."));
    }

    let access_token = state
        .jwt_config
        .generate_access_token(user.id, &user.username, user.role)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Erro interno. Tente novamente.")
        })?;

    info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
    }))
}

/// Returns the currently authenticated user.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Contas",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .optional()
        .map_err(|e| storage_error("load current user", e))?;

    let user = user.ok_or_else(|| ApiError::not_found("Usuário não encontrado."))?;

    Ok(Json(user.into()))
}
