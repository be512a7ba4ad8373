use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use intranet_types::api::ErrorBody;

use crate::otp::OtpError;
use crate::submission::SubmissionError;

/// Every failure a handler can return. Expected outcomes keep their reason
/// so the client can render an accurate message; store failures collapse to
/// a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("authentication required")]
    Unauthorized,

    #[error("not allowed")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn parts(self) -> (StatusCode, ErrorBody) {
        let message = self.to_string();
        let body = |error: &str| ErrorBody {
            error: error.to_string(),
            message: message.clone(),
            ..ErrorBody::default()
        };

        match self {
            Self::Otp(e) => match e {
                OtpError::InvalidPhone => (StatusCode::BAD_REQUEST, body("invalid_phone")),
                OtpError::NotRegistered => (StatusCode::NOT_FOUND, body("not_registered")),
                OtpError::TooSoon { retry_after_secs } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorBody {
                        retry_after_secs: Some(retry_after_secs),
                        ..body("too_soon")
                    },
                ),
                OtpError::Expired => (StatusCode::UNAUTHORIZED, body("expired")),
                OtpError::Mismatch { attempts_remaining } => (
                    StatusCode::UNAUTHORIZED,
                    ErrorBody {
                        attempts_remaining: Some(attempts_remaining),
                        ..body("mismatch")
                    },
                ),
                OtpError::Exhausted => (
                    StatusCode::UNAUTHORIZED,
                    ErrorBody {
                        attempts_remaining: Some(0),
                        ..body("exhausted")
                    },
                ),
                OtpError::Store(e) => internal(e),
            },
            Self::Submission(e) => match e {
                SubmissionError::TooShort { .. } => (StatusCode::BAD_REQUEST, body("too_short")),
                SubmissionError::TooLong { .. } => (StatusCode::BAD_REQUEST, body("too_long")),
                SubmissionError::InvalidCategory => {
                    (StatusCode::BAD_REQUEST, body("invalid_category"))
                }
                SubmissionError::RateLimited { resets_at } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorBody {
                        resets_at: Some(resets_at),
                        ..body("rate_limited")
                    },
                ),
                SubmissionError::Store(e) => internal(e),
            },
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, body("unauthorized")),
            Self::Forbidden => (StatusCode::FORBIDDEN, body("forbidden")),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, body("bad_request")),
            Self::Internal(e) => internal(e),
        }
    }
}

fn internal(e: anyhow::Error) -> (StatusCode, ErrorBody) {
    error!("request failed: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody {
            error: "internal".to_string(),
            message: "something went wrong; please try again".to_string(),
            ..ErrorBody::default()
        },
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        let retry_after = body.retry_after_secs;
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
