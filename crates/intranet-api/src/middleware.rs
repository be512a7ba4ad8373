use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use intranet_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::session::AuthSession;

/// Extract the bearer token, resolve it to a live session and attach the
/// [`AuthSession`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let session = state
        .sessions
        .authenticate(token)?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Layer after [`require_auth`]: only admins get through.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let session = req
        .extensions()
        .get::<AuthSession>()
        .ok_or(ApiError::Unauthorized)?;

    if session.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
