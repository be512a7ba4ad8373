//! Outbound SMS delivery.
//!
//! Delivery is best-effort: senders report what happened in a
//! [`DeliveryReport`] and never retry.

pub mod log;
pub mod twilio;

use async_trait::async_trait;

pub use log::LogSender;
pub use twilio::{TwilioOptions, TwilioSender};

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("request to SMS provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("SMS provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outcome of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success: bool,
    pub error_detail: Option<String>,
}

impl DeliveryReport {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error_detail: Some(detail.into()),
        }
    }
}

impl From<Result<(), SmsError>> for DeliveryReport {
    fn from(result: Result<(), SmsError>) -> Self {
        match result {
            Ok(()) => Self::delivered(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send `body` to the E.164 number `to`.
    async fn send(&self, to: &str, body: &str) -> DeliveryReport;
}
