use std::sync::Arc;

use axum::{
    Json, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use intranet_api::auth::{self, AppState, AppStateInner};
use intranet_api::clock::Clock;
use intranet_api::middleware::{require_admin, require_auth};
use intranet_api::otp::OtpAuthenticator;
use intranet_api::session::SessionIssuer;
use intranet_api::submission::SubmissionGate;
use intranet_api::suggestions;
use intranet_crypto::source::SourceHasher;
use intranet_db::Database;
use intranet_sms::SmsSender;

use crate::config::Config;

pub fn build_state(
    config: &Config,
    db: Arc<Database>,
    sms: Arc<dyn SmsSender>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AppState> {
    let otp = OtpAuthenticator::new(db.clone(), db.clone(), sms, clock.clone(), config.otp.clone());
    let gate = SubmissionGate::new(db.clone(), db.clone(), clock.clone(), config.submission.clone());
    let sessions = SessionIssuer::new(
        &config.jwt_secret,
        config.session_ttl,
        db.clone(),
        db.clone(),
        clock,
    );
    let source_hasher = SourceHasher::new(config.source_pepper.as_bytes())?;

    Ok(Arc::new(AppStateInner {
        db,
        otp,
        gate,
        sessions,
        source_hasher,
        trust_forwarded_for: config.trust_forwarded_for,
    }))
}

/// Create an admin account for each phone that has none.
pub fn seed_admins(db: &Database, phones: &[String]) -> anyhow::Result<()> {
    for phone in phones {
        if db.ensure_account(&Uuid::new_v4().to_string(), phone, "Administrator", "admin")? {
            info!(phone = %intranet_api::phone::mask(phone), "Seeded admin account");
        }
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/otp/request", post(auth::request_code))
        .route("/auth/otp/verify", post(auth::verify_code))
        .route("/suggestions", post(suggestions::submit_suggestion))
        .route("/suggestions/categories", get(suggestions::list_categories))
        .route("/suggestions/limit", get(suggestions::rate_limit_status))
        .route("/health", get(health));

    let session_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/suggestions", get(suggestions::list_suggestions))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
