//! OpenAPI documentation configuration.
//!
//! Generates the OpenAPI specification with `utoipa` and serves it via
//! Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::handlers::auth::{AuthResponse, LoginRequest, RegisterRequest, UserResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cognitive API",
        version = "1.0.0",
        description = "Backend for the Cognitive therapy companion.\n\n\
        ## Features\n\
        - Patient and psychologist accounts with JWT sessions\n\
        - Master codes gating psychologist registration\n\
        - One-time patient codes linking each patient to one psychologist\n\
        - Daily diary entries with activity tags\n\
        - Agenda slots with race-safe reservation\n\
        - Private consultation notes\n\n\
        ## Authentication\n\
        Most endpoints require a JWT bearer token.\n\
        1. Register or login to get an access token\n\
        2. Include it in requests: `Authorization: Bearer <token>`\n\n\
        Error responses always carry a `{\"detail\": \"...\"}` body.",
        contact(
            name = "Cognitive API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Saúde", description = "Health check endpoints"),
        (name = "Contas", description = "Registration, login, and sessions"),
        (name = "Códigos", description = "Master and patient access codes"),
        (name = "Vínculo", description = "Patient/psychologist linking"),
        (name = "Pacientes", description = "Psychologist-side patient views"),
        (name = "Atividades", description = "Activity catalog"),
        (name = "Diário", description = "Daily diary entries"),
        (name = "Agenda", description = "Agenda slots and reservations"),
        (name = "Consultas", description = "Consultation notes")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::health_status,
        crate::handlers::health::readiness_check,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,

        crate::handlers::codes::create_master_code,
        crate::handlers::codes::validate_master_code,
        crate::handlers::codes::create_patient_code,
        crate::handlers::codes::list_patient_codes,

        crate::handlers::link::redeem_patient_code,
        crate::handlers::link::get_link,

        crate::handlers::patients::list_patients,
        crate::handlers::patients::get_stats,

        crate::handlers::activities::list_activities,
        crate::handlers::activities::create_activity,
        crate::handlers::activities::update_activity,
        crate::handlers::activities::delete_activity,

        crate::handlers::diary::create_entry,
        crate::handlers::diary::get_history,

        crate::handlers::agenda::create_slot,
        crate::handlers::agenda::list_slots,
        crate::handlers::agenda::reserve_slot,
        crate::handlers::agenda::delete_slot,

        crate::handlers::consultations::create_note,
        crate::handlers::consultations::list_notes,
    ),
    components(
        schemas(
            ApiError,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            UserResponse,

            crate::models::Role,
            crate::models::Activity,
            crate::models::AgendaSlot,
            crate::models::ConsultationNote,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::HealthStatusResponse,

            crate::handlers::codes::MasterCodeResponse,
            crate::handlers::codes::CodeValidationResponse,
            crate::handlers::codes::IssuePatientCodeRequest,
            crate::handlers::codes::PatientCodeResponse,

            crate::handlers::link::RedeemCodeRequest,
            crate::handlers::link::LinkResponse,
            crate::handlers::link::LinkedPsychologistResponse,
            crate::handlers::link::PsychologistSummary,

            crate::handlers::patients::LinkedPatientResponse,
            crate::handlers::patients::PsychologistStatsResponse,

            crate::handlers::activities::ActivityRequest,

            crate::handlers::diary::CreateDiaryEntryRequest,
            crate::handlers::diary::DiaryEntryResponse,

            crate::handlers::agenda::CreateSlotRequest,
            crate::handlers::agenda::SlotResponse,

            crate::handlers::consultations::CreateConsultationNoteRequest,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /login or /register.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Cognitive API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components should exist");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_all_route_groups_documented() {
        let spec = ApiDoc::openapi();
        let paths = spec.paths.paths;
        assert!(paths.contains_key("/register"));
        assert!(paths.contains_key("/link"));
        assert!(paths.contains_key("/diary"));
        assert!(paths.contains_key("/agenda/slots"));
        assert!(paths.contains_key("/consultations"));
    }
}
