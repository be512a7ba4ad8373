use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use intranet_crypto::source::SourceHasher;
use intranet_db::Database;
use intranet_types::api::{
    MeResponse, RequestCodeRequest, RequestCodeResponse, VerifyCodeRequest, VerifyCodeResponse,
};

use crate::error::ApiError;
use crate::otp::OtpAuthenticator;
use crate::session::{AuthSession, SessionIssuer};
use crate::store::AccountDirectory;
use crate::submission::SubmissionGate;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub otp: OtpAuthenticator,
    pub gate: SubmissionGate,
    pub sessions: SessionIssuer,
    pub source_hasher: SourceHasher,
    /// Take the client address from `X-Forwarded-For` (behind a reverse proxy).
    pub trust_forwarded_for: bool,
}

/// POST /auth/otp/request
pub async fn request_code(
    State(state): State<AppState>,
    Json(req): Json<RequestCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state.otp.request_code(&req.phone).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RequestCodeResponse {
            expires_at: issued.expires_at,
            resend_after: issued.resend_after,
        }),
    ))
}

/// POST /auth/otp/verify
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.otp.verify_code(&req.phone, &req.code)?;
    let issued = state.sessions.issue(&account)?;

    Ok(Json(VerifyCodeResponse {
        token: issued.token,
        user_id: account.id,
        name: account.name,
        role: account.role,
        expires_at: issued.session.expires_at,
    }))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.revoke(session.session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .db
        .find_account(session.account_id)?
        .filter(|a| a.active)
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(MeResponse {
        user_id: account.id,
        name: account.name,
        role: account.role,
        session_expires_at: session.expires_at,
    }))
}
