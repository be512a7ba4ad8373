use std::net::{IpAddr, SocketAddr};

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, warn};

use intranet_types::api::{
    CategoryResponse, SubmitSuggestionRequest, SubmitSuggestionResponse, SuggestionResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::submission::SubmissionInput;

/// Keyed hash of the caller's address. The raw address is dropped here and
/// never reaches the gate.
pub struct ClientSource(pub String);

impl FromRequestParts<AppState> for ClientSource {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let signal = client_ip(&parts.headers, peer, state.trust_forwarded_for)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| {
                warn!("no client address on request; using shared rate-limit bucket");
                "unknown".to_string()
            });

        Ok(Self(state.source_hasher.hash(&signal)))
    }
}

/// The address to rate-limit on. Behind a trusted proxy that is the
/// rightmost `X-Forwarded-For` entry, the one the proxy appended; anything
/// left of it came from the client. Falls back to the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded_for: bool) -> Option<IpAddr> {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get_all("x-forwarded-for")
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .last()
                .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        })
        .flatten();

    forwarded.or(peer)
}

/// GET /suggestions/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let categories: Vec<CategoryResponse> = state
        .db
        .list_active_categories()?
        .into_iter()
        .map(|c| CategoryResponse { id: c.id, name: c.name })
        .collect();

    Ok(Json(categories))
}

/// GET /suggestions/limit
pub async fn rate_limit_status(
    State(state): State<AppState>,
    ClientSource(source_hash): ClientSource,
) -> Result<impl IntoResponse, ApiError> {
    let gate = state.gate.clone();
    let status = tokio::task::spawn_blocking(move || gate.check_rate_limit(&source_hash))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })??;

    Ok(Json(status))
}

/// POST /suggestions
///
/// A filled honeypot gets the same 201 as a stored suggestion.
pub async fn submit_suggestion(
    State(state): State<AppState>,
    ClientSource(source_hash): ClientSource,
    Json(req): Json<SubmitSuggestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = SubmissionInput {
        content: req.content,
        category_id: req.category_id,
        honeypot: req.website,
    };

    let gate = state.gate.clone();
    tokio::task::spawn_blocking(move || gate.submit(&input, &source_hash))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })??;

    Ok((
        StatusCode::CREATED,
        Json(SubmitSuggestionResponse { accepted: true }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `submitted_at` and `id` of the last suggestion on the
    /// previous page. Both or neither.
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<uuid::Uuid>,
}

fn default_limit() -> u32 {
    50
}

/// GET /admin/suggestions
pub async fn list_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let limit = query.limit.clamp(1, 200);
    let before = match (query.before, query.before_id) {
        (Some(at), Some(id)) => Some((at.timestamp(), id.to_string())),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "`before` and `before_id` must be given together".to_string(),
            ));
        }
    };

    let rows = tokio::task::spawn_blocking(move || {
        db.list_suggestions(limit, before.as_ref().map(|(at, id)| (*at, id.as_str())))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })??;

    let suggestions = rows
        .into_iter()
        .map(|row| -> Result<SuggestionResponse, ApiError> {
            Ok(SuggestionResponse {
                id: row.id.parse::<uuid::Uuid>().map_err(anyhow::Error::from)?,
                content: row.content,
                category_id: row.category_id,
                category_name: row.category_name,
                submitted_at: crate::store::from_unix(row.submitted_at)?,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(suggestions))
}
