//! Persistence seams for the login and suggestion components.
//!
//! Each mutating call is a single atomic operation keyed by the entity key,
//! so concurrent handlers (in this process or another) cannot both act on
//! the same pre-mutation state. [`Database`] implements every trait.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use intranet_db::Database;
use intranet_db::models::{AccountRow, NewOtp, NewSuggestion};
use intranet_types::models::{Account, Suggestion};

/// Stored state of one identifier's one-time code.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub identifier: String,
    pub code_digest: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
    pub consumed: bool,
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub role: intranet_types::models::Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub trait AccountDirectory: Send + Sync {
    fn find_active_account(&self, phone: &str) -> Result<Option<Account>>;
    fn find_account(&self, id: Uuid) -> Result<Option<Account>>;
}

pub trait OtpStore: Send + Sync {
    /// Overwrite the identifier's code with `record` unless the current one
    /// was issued after `cooldown_cutoff`. Returns false if blocked.
    fn issue(&self, record: &OtpRecord, cooldown_cutoff: DateTime<Utc>) -> Result<bool>;

    fn find(&self, identifier: &str) -> Result<Option<OtpRecord>>;

    /// Consume the live code if its digest matches. Returns true on match.
    fn consume(&self, identifier: &str, code_digest: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Burn one attempt on the live code; `None` if there is no live code.
    fn spend_attempt(&self, identifier: &str, now: DateTime<Utc>) -> Result<Option<u32>>;
}

pub trait CategoryDirectory: Send + Sync {
    fn is_active_category(&self, id: &str) -> Result<bool>;
}

pub trait SubmissionStore: Send + Sync {
    fn rate_window(&self, source_hash: &str) -> Result<Option<RateWindow>>;

    /// Take a slot in `source_hash`'s window starting at `window_start` and
    /// persist `suggestion`, all or nothing. Returns the window count after
    /// the write, or `None` if the window was full.
    fn record_within_limit(
        &self,
        source_hash: &str,
        window_start: DateTime<Utc>,
        max_per_window: u32,
        suggestion: &Suggestion,
    ) -> Result<Option<u32>>;
}

pub trait SessionStore: Send + Sync {
    fn create(&self, session: &SessionRecord) -> Result<()>;
    fn find(&self, id: Uuid) -> Result<Option<SessionRecord>>;
    fn revoke(&self, id: Uuid) -> Result<bool>;
}

pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", secs))
}

fn account_from_row(row: AccountRow) -> Result<Account> {
    Ok(Account {
        id: row.id.parse()?,
        phone: row.phone,
        name: row.name,
        role: row.role.parse().map_err(|e: String| anyhow!(e))?,
        active: row.active,
    })
}

impl AccountDirectory for Database {
    fn find_active_account(&self, phone: &str) -> Result<Option<Account>> {
        self.get_active_account_by_phone(phone)?
            .map(account_from_row)
            .transpose()
    }

    fn find_account(&self, id: Uuid) -> Result<Option<Account>> {
        self.get_account_by_id(&id.to_string())?
            .map(account_from_row)
            .transpose()
    }
}

impl OtpStore for Database {
    fn issue(&self, record: &OtpRecord, cooldown_cutoff: DateTime<Utc>) -> Result<bool> {
        self.issue_otp(
            &NewOtp {
                identifier: &record.identifier,
                code_hash: &record.code_digest,
                issued_at: record.issued_at.timestamp(),
                expires_at: record.expires_at.timestamp(),
                attempts: record.attempts_remaining,
            },
            cooldown_cutoff.timestamp(),
        )
    }

    fn find(&self, identifier: &str) -> Result<Option<OtpRecord>> {
        self.get_otp(identifier)?
            .map(|row| -> Result<OtpRecord> {
                Ok(OtpRecord {
                    identifier: row.identifier,
                    code_digest: row.code_hash,
                    issued_at: from_unix(row.issued_at)?,
                    expires_at: from_unix(row.expires_at)?,
                    attempts_remaining: row.attempts_remaining,
                    consumed: row.consumed,
                })
            })
            .transpose()
    }

    fn consume(&self, identifier: &str, code_digest: &str, now: DateTime<Utc>) -> Result<bool> {
        self.consume_otp(identifier, code_digest, now.timestamp())
    }

    fn spend_attempt(&self, identifier: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
        self.spend_otp_attempt(identifier, now.timestamp())
    }
}

impl CategoryDirectory for Database {
    fn is_active_category(&self, id: &str) -> Result<bool> {
        Database::is_active_category(self, id)
    }
}

impl SubmissionStore for Database {
    fn rate_window(&self, source_hash: &str) -> Result<Option<RateWindow>> {
        self.get_rate_window(source_hash)?
            .map(|row| -> Result<RateWindow> {
                Ok(RateWindow {
                    window_start: from_unix(row.window_start)?,
                    count: row.count,
                })
            })
            .transpose()
    }

    fn record_within_limit(
        &self,
        source_hash: &str,
        window_start: DateTime<Utc>,
        max_per_window: u32,
        suggestion: &Suggestion,
    ) -> Result<Option<u32>> {
        let id = suggestion.id.to_string();
        self.insert_suggestion_within_limit(
            source_hash,
            window_start.timestamp(),
            max_per_window,
            &NewSuggestion {
                id: &id,
                content: &suggestion.content,
                category_id: &suggestion.category_id,
                submitted_at: suggestion.submitted_at.timestamp(),
            },
        )
    }
}

impl SessionStore for Database {
    fn create(&self, session: &SessionRecord) -> Result<()> {
        self.create_session(
            &session.id.to_string(),
            &session.account_id.to_string(),
            session.role.as_str(),
            session.issued_at.timestamp(),
            session.expires_at.timestamp(),
        )
    }

    fn find(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        self.get_session(&id.to_string())?
            .map(|row| -> Result<SessionRecord> {
                Ok(SessionRecord {
                    id: row.id.parse()?,
                    account_id: row.account_id.parse()?,
                    role: row.role.parse().map_err(|e: String| anyhow!(e))?,
                    issued_at: from_unix(row.issued_at)?,
                    expires_at: from_unix(row.expires_at)?,
                })
            })
            .transpose()
    }

    fn revoke(&self, id: Uuid) -> Result<bool> {
        self.delete_session(&id.to_string())
    }
}
