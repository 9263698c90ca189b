//! Cognitive - backend for a therapy companion: accounts, patient linking,
//! diary entries, and agenda scheduling.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod schema;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use middleware::{
    rate_limit::{
        auth_rate_limit_middleware, rate_limit_middleware, RateLimitConfig, RateLimitState,
    },
    request_id::request_id_middleware,
};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub password_hash_cost: u32,
    pub min_password_length: usize,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(
                RateLimitConfig::new(config.security.rate_limit_requests_per_minute, 60),
                RateLimitConfig::strict(),
            )
        } else {
            RateLimitState::disabled()
        };

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            password_hash_cost: config.security.password_hash_cost,
            min_password_length: config.security.min_password_length,
            admin_token: config.security.admin_token.clone(),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/status", get(handlers::health::health_status))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/codes/master", post(handlers::codes::create_master_code))
        .route(
            "/codes/master/validate/{code}",
            get(handlers::codes::validate_master_code),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone());

    // Any authenticated user.
    let session_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route("/activities", get(handlers::activities::list_activities))
        .route(
            "/diary/history/{patient_id}",
            get(handlers::diary::get_history),
        )
        .route(
            "/agenda/psychologist/{psychologist_id}",
            get(handlers::agenda::list_slots),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let psychologist_routes = Router::new()
        .route(
            "/codes/patient/{psychologist_id}",
            post(handlers::codes::create_patient_code),
        )
        .route(
            "/codes/patient/{psychologist_id}",
            get(handlers::codes::list_patient_codes),
        )
        .route(
            "/psychologists/{psychologist_id}/patients",
            get(handlers::patients::list_patients),
        )
        .route(
            "/psychologists/{psychologist_id}/stats",
            get(handlers::patients::get_stats),
        )
        .route("/activities", post(handlers::activities::create_activity))
        .route(
            "/activities/{activity_id}",
            put(handlers::activities::update_activity),
        )
        .route(
            "/activities/{activity_id}",
            delete(handlers::activities::delete_activity),
        )
        .route("/agenda/slots", post(handlers::agenda::create_slot))
        .route(
            "/agenda/slots/{slot_id}",
            delete(handlers::agenda::delete_slot),
        )
        .route(
            "/consultations",
            post(handlers::consultations::create_note),
        )
        .route(
            "/consultations/{psychologist_id}/{patient_id}",
            get(handlers::consultations::list_notes),
        )
        .layer(axum_middleware::from_fn(
            middleware::auth::require_psychologist,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let patient_routes = Router::new()
        .route("/link", post(handlers::link::redeem_patient_code))
        .route("/link", get(handlers::link::get_link))
        .route("/diary", post(handlers::diary::create_entry))
        .route(
            "/agenda/slots/{slot_id}/reserve",
            put(handlers::agenda::reserve_slot),
        )
        .layer(axum_middleware::from_fn(middleware::auth::require_patient))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(session_routes)
        .merge(psychologist_routes)
        .merge(patient_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"detail": "Não encontrado."})),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let cors = if is_wildcard_origin {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.cors.max_age_secs))
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(600)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        let _ = build_cors_layer(&config);
    }
}
