pub mod config;
pub mod database;
pub mod dto;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::store::SessionStore;
use crate::engine::EngineSettings;
use crate::middleware::auth::{require_user, AuthKeys};
use crate::services::attempt_service::AttemptService;

#[derive(Clone)]
pub struct AppState {
    pub attempts: AttemptService,
    pub auth: AuthKeys,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, settings: EngineSettings, jwt_secret: &str) -> Self {
        Self {
            attempts: AttemptService::new(store, settings),
            auth: AuthKeys::new(jwt_secret),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let session_api = Router::new()
        .route(
            "/api/tests/:test_id/sessions",
            post(routes::sessions::start_session),
        )
        .route(
            "/api/sessions/:attempt_id",
            get(routes::sessions::get_session),
        )
        .route(
            "/api/sessions/:attempt_id/resume",
            post(routes::sessions::resume_session),
        )
        .route(
            "/api/sessions/:attempt_id/answers/:question_id",
            put(routes::sessions::set_answer)
                .get(routes::sessions::get_answer)
                .delete(routes::sessions::clear_answer),
        )
        .route(
            "/api/sessions/:attempt_id/flags/:question_id",
            post(routes::sessions::toggle_flag),
        )
        .route(
            "/api/sessions/:attempt_id/navigation",
            post(routes::sessions::navigate),
        )
        .route(
            "/api/sessions/:attempt_id/submit",
            post(routes::sessions::submit_session),
        )
        .route(
            "/api/sessions/:attempt_id/result",
            get(routes::sessions::get_result),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_user,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(session_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
