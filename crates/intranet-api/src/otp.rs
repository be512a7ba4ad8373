//! One-time code login.
//!
//! A code moves `NoCode -> Issued -> {Consumed | Expired | Exhausted}`.
//! Only `Issued` can verify; every terminal state needs a fresh
//! [`OtpAuthenticator::request_code`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use intranet_crypto::otp::{code_digest, generate_code, is_well_formed};
use intranet_sms::{DeliveryReport, SmsSender};
use intranet_types::models::Account;

use crate::clock::Clock;
use crate::phone;
use crate::store::{AccountDirectory, OtpRecord, OtpStore};

#[derive(Debug, Clone)]
pub struct OtpPolicy {
    pub code_ttl: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: u32,
    pub default_country_code: String,
    /// Upper bound on how long a spawned delivery may take.
    pub delivery_timeout: StdDuration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(10),
            resend_cooldown: Duration::seconds(60),
            max_attempts: 3,
            default_country_code: "233".to_string(),
            delivery_timeout: StdDuration::from_secs(15),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("that does not look like a phone number")]
    InvalidPhone,

    #[error("no active account uses this phone number")]
    NotRegistered,

    #[error("a code was sent recently; try again in {retry_after_secs}s")]
    TooSoon { retry_after_secs: u64 },

    #[error("no valid code for this number; request a new one")]
    Expired,

    #[error("incorrect code; {attempts_remaining} attempt(s) left")]
    Mismatch { attempts_remaining: u32 },

    #[error("too many incorrect attempts; request a new code")]
    Exhausted,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A freshly issued code. `delivery` resolves once the SMS attempt is over;
/// request handlers drop it, the code is valid either way.
#[derive(Debug)]
pub struct CodeIssued {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
    pub resend_after: DateTime<Utc>,
    pub delivery: JoinHandle<DeliveryReport>,
}

#[derive(Clone)]
pub struct OtpAuthenticator {
    accounts: Arc<dyn AccountDirectory>,
    codes: Arc<dyn OtpStore>,
    sms: Arc<dyn SmsSender>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
}

impl OtpAuthenticator {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        codes: Arc<dyn OtpStore>,
        sms: Arc<dyn SmsSender>,
        clock: Arc<dyn Clock>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            accounts,
            codes,
            sms,
            clock,
            policy,
        }
    }

    fn normalize(&self, raw: &str) -> Result<String, OtpError> {
        phone::normalize(raw, &self.policy.default_country_code).ok_or(OtpError::InvalidPhone)
    }

    /// Issue a code for a registered phone and hand it to the SMS sender.
    ///
    /// Returns once the code is persisted; delivery runs on its own task.
    pub async fn request_code(&self, raw_phone: &str) -> Result<CodeIssued, OtpError> {
        let identifier = self.normalize(raw_phone)?;

        if self.accounts.find_active_account(&identifier)?.is_none() {
            info!(phone = %phone::mask(&identifier), "code requested for unregistered phone");
            return Err(OtpError::NotRegistered);
        }

        let now = self.clock.now();
        let code = generate_code();
        let record = OtpRecord {
            identifier: identifier.clone(),
            code_digest: code_digest(&identifier, &code),
            issued_at: now,
            expires_at: now + self.policy.code_ttl,
            attempts_remaining: self.policy.max_attempts,
            consumed: false,
        };

        if !self.codes.issue(&record, now - self.policy.resend_cooldown)? {
            let retry_after_secs = self.retry_after(&identifier, now)?;
            debug!(phone = %phone::mask(&identifier), retry_after_secs, "code request inside cooldown");
            return Err(OtpError::TooSoon { retry_after_secs });
        }

        info!(phone = %phone::mask(&identifier), "one-time code issued");

        let body = format!(
            "Your intranet login code is {}. It expires in {} minutes.",
            code,
            self.policy.code_ttl.num_minutes()
        );
        let delivery = self.dispatch(identifier.clone(), body);

        Ok(CodeIssued {
            identifier,
            expires_at: record.expires_at,
            resend_after: now + self.policy.resend_cooldown,
            delivery,
        })
    }

    /// Seconds until the cooldown on the current code lapses.
    fn retry_after(&self, identifier: &str, now: DateTime<Utc>) -> Result<u64, OtpError> {
        let cooldown = self.policy.resend_cooldown.num_seconds();
        let secs = match self.codes.find(identifier)? {
            Some(existing) => existing.issued_at.timestamp() + cooldown - now.timestamp(),
            None => cooldown,
        };
        Ok(secs.max(1) as u64)
    }

    fn dispatch(&self, to: String, body: String) -> JoinHandle<DeliveryReport> {
        let sms = self.sms.clone();
        let timeout = self.policy.delivery_timeout;

        tokio::spawn(async move {
            let report = match tokio::time::timeout(timeout, sms.send(&to, &body)).await {
                Ok(report) => report,
                Err(_) => DeliveryReport::failed(format!("timed out after {:?}", timeout)),
            };

            if report.success {
                debug!(phone = %phone::mask(&to), "code delivered to SMS provider");
            } else {
                warn!(
                    phone = %phone::mask(&to),
                    error = report.error_detail.as_deref().unwrap_or("unknown"),
                    "code delivery failed; code remains valid"
                );
            }
            report
        })
    }

    /// Check a submitted code. On success the code is consumed and the
    /// account it belongs to is returned.
    pub fn verify_code(&self, raw_phone: &str, submitted: &str) -> Result<Account, OtpError> {
        let identifier = self.normalize(raw_phone)?;
        let submitted = submitted.trim();
        let now = self.clock.now();

        if is_well_formed(submitted)
            && self
                .codes
                .consume(&identifier, &code_digest(&identifier, submitted), now)?
        {
            let account = self
                .accounts
                .find_active_account(&identifier)?
                .ok_or(OtpError::NotRegistered)?;
            info!(phone = %phone::mask(&identifier), account = %account.id, "code verified");
            return Ok(account);
        }

        match self.codes.spend_attempt(&identifier, now)? {
            Some(0) => {
                warn!(phone = %phone::mask(&identifier), "code exhausted by incorrect attempts");
                Err(OtpError::Exhausted)
            }
            Some(attempts_remaining) => Err(OtpError::Mismatch { attempts_remaining }),
            None => match self.codes.find(&identifier)? {
                Some(r) if !r.consumed && r.expires_at > now && r.attempts_remaining == 0 => {
                    Err(OtpError::Exhausted)
                }
                _ => Err(OtpError::Expired),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_login_form() {
        let policy = OtpPolicy::default();
        assert_eq!(policy.code_ttl, Duration::minutes(10));
        assert_eq!(policy.resend_cooldown, Duration::seconds(60));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn error_messages_carry_counts() {
        assert_eq!(
            OtpError::Mismatch { attempts_remaining: 2 }.to_string(),
            "incorrect code; 2 attempt(s) left"
        );
        assert_eq!(
            OtpError::TooSoon { retry_after_secs: 42 }.to_string(),
            "a code was sent recently; try again in 42s"
        );
    }
}
