use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use chrono::Duration;

use intranet_api::otp::OtpPolicy;
use intranet_api::phone;
use intranet_api::submission::SubmissionPolicy;
use intranet_sms::TwilioOptions;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub source_pepper: String,
    pub otp: OtpPolicy,
    pub submission: SubmissionPolicy,
    pub session_ttl: Duration,
    /// `None` means codes are only logged.
    pub twilio: Option<TwilioOptions>,
    pub cleanup_interval_secs: u64,
    pub trust_forwarded_for: bool,
    /// Canonical phones to seed as admin accounts.
    pub bootstrap_admins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = required_secret(var("INTRANET_JWT_SECRET"), "INTRANET_JWT_SECRET")?;
        let source_pepper =
            required_secret(var("INTRANET_SOURCE_PEPPER"), "INTRANET_SOURCE_PEPPER")?;

        let default_country_code =
            var("INTRANET_DEFAULT_COUNTRY_CODE").unwrap_or_else(|| "233".into());
        if default_country_code.is_empty()
            || !default_country_code.bytes().all(|b| b.is_ascii_digit())
        {
            bail!("INTRANET_DEFAULT_COUNTRY_CODE must be digits only, got {:?}", default_country_code);
        }

        let defaults = OtpPolicy::default();
        let otp = OtpPolicy {
            code_ttl: Duration::seconds(parse_or(
                var("INTRANET_OTP_TTL_SECS"),
                "INTRANET_OTP_TTL_SECS",
                defaults.code_ttl.num_seconds(),
            )?),
            resend_cooldown: Duration::seconds(parse_or(
                var("INTRANET_OTP_COOLDOWN_SECS"),
                "INTRANET_OTP_COOLDOWN_SECS",
                defaults.resend_cooldown.num_seconds(),
            )?),
            max_attempts: parse_or(
                var("INTRANET_OTP_MAX_ATTEMPTS"),
                "INTRANET_OTP_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
            default_country_code: default_country_code.clone(),
            ..defaults
        };
        if otp.max_attempts == 0 || otp.code_ttl <= Duration::zero() {
            bail!("OTP TTL and max attempts must both be positive");
        }

        let defaults = SubmissionPolicy::default();
        let submission = SubmissionPolicy {
            min_len: parse_or(
                var("INTRANET_SUGGESTION_MIN_LEN"),
                "INTRANET_SUGGESTION_MIN_LEN",
                defaults.min_len,
            )?,
            max_len: parse_or(
                var("INTRANET_SUGGESTION_MAX_LEN"),
                "INTRANET_SUGGESTION_MAX_LEN",
                defaults.max_len,
            )?,
            window: Duration::seconds(parse_or(
                var("INTRANET_SUGGESTION_WINDOW_SECS"),
                "INTRANET_SUGGESTION_WINDOW_SECS",
                defaults.window.num_seconds(),
            )?),
            max_per_window: parse_or(
                var("INTRANET_SUGGESTION_MAX_PER_WINDOW"),
                "INTRANET_SUGGESTION_MAX_PER_WINDOW",
                defaults.max_per_window,
            )?,
        };
        submission.validate()?;

        let session_ttl_hours: i64 =
            parse_or(var("INTRANET_SESSION_TTL_HOURS"), "INTRANET_SESSION_TTL_HOURS", 12)?;
        if session_ttl_hours < 1 {
            bail!("INTRANET_SESSION_TTL_HOURS must be at least 1");
        }

        let twilio = match (
            var("TWILIO_ACCOUNT_SID"),
            var("TWILIO_AUTH_TOKEN"),
            var("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioOptions {
                account_sid,
                auth_token,
                from_number,
            }),
            (None, None, None) => None,
            _ => bail!("TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_FROM_NUMBER must be set together"),
        };

        let bootstrap_admins = var("INTRANET_BOOTSTRAP_ADMINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        phone::normalize(p, &default_country_code)
                            .with_context(|| format!("invalid phone in INTRANET_BOOTSTRAP_ADMINS: {:?}", p))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            host: var("INTRANET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("INTRANET_PORT"), "INTRANET_PORT", 3000)?,
            db_path: var("INTRANET_DB_PATH").unwrap_or_else(|| "intranet.db".into()).into(),
            jwt_secret,
            source_pepper,
            otp,
            submission,
            session_ttl: Duration::hours(session_ttl_hours),
            twilio,
            cleanup_interval_secs: parse_or::<u64>(
                var("INTRANET_CLEANUP_INTERVAL_SECS"),
                "INTRANET_CLEANUP_INTERVAL_SECS",
                300,
            )?
            .max(1),
            trust_forwarded_for: parse_or(
                var("INTRANET_TRUST_FORWARDED_FOR"),
                "INTRANET_TRUST_FORWARDED_FOR",
                false,
            )?,
            bootstrap_admins,
        })
    }
}

fn required_secret(value: Option<String>, key: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !PLACEHOLDER_SECRETS.contains(&v.as_str()) => Ok(v),
        _ => bail!("{} is unset or still a placeholder; set it in your .env file and restart", key),
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, v)),
        None => Ok(default),
    }
}
