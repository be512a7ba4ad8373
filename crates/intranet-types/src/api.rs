use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- JWT Claims --

/// Session token claims. `jti` is the server-side session id; a token is
/// only honoured while that session row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestCodeRequest {
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestCodeResponse {
    pub expires_at: DateTime<Utc>,
    pub resend_after: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub token: String,
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub session_expires_at: DateTime<Utc>,
}

// -- Suggestions --

/// `website` is the honeypot: the form hides it, so humans leave it empty.
/// Unknown fields are ignored so bots padding the form still get a 201.
#[derive(Debug, Deserialize)]
pub struct SubmitSuggestionRequest {
    pub content: String,
    pub category_id: String,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitSuggestionResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub id: Uuid,
    pub content: String,
    pub category_id: String,
    pub category_name: String,
    pub submitted_at: DateTime<Utc>,
}

// -- Errors --

/// JSON body returned with every non-2xx response.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}
