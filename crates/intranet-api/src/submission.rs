//! Anonymous suggestion box.
//!
//! Callers hash the client signal before it reaches this module; only the
//! hash is used, and only as a rate-limit key. Stored suggestions carry no
//! reference to it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use intranet_types::api::RateLimitStatus;
use intranet_types::models::Suggestion;

use crate::clock::Clock;
use crate::store::{CategoryDirectory, SubmissionStore, from_unix};

/// Fixed-bucket limits: a window covers `[k * window, (k + 1) * window)`
/// in unix seconds.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    pub min_len: usize,
    pub max_len: usize,
    pub window: Duration,
    pub max_per_window: u32,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            min_len: 10,
            max_len: 2000,
            window: Duration::hours(1),
            max_per_window: 5,
        }
    }
}

impl SubmissionPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_len > self.max_len {
            anyhow::bail!("suggestion min length {} exceeds max {}", self.min_len, self.max_len);
        }
        if self.max_per_window == 0 {
            anyhow::bail!("suggestion max per window must be at least 1");
        }
        if self.window.num_seconds() < 1 {
            anyhow::bail!("suggestion window must be at least one second");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("suggestion is too short ({actual} of at least {min_len} characters)")]
    TooShort { min_len: usize, actual: usize },

    #[error("suggestion is too long ({actual} of at most {max_len} characters)")]
    TooLong { max_len: usize, actual: usize },

    #[error("unknown or inactive category")]
    InvalidCategory,

    #[error("submission limit reached; try again after {resets_at}")]
    RateLimited { resets_at: DateTime<Utc> },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Inbound form fields.
#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub content: String,
    pub category_id: String,
    pub honeypot: Option<String>,
}

/// What happened to an accepted submission. Callers must report both
/// variants to the client identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Stored { remaining: u32 },
    /// Honeypot was filled in: nothing stored, no slot used.
    Discarded,
}

#[derive(Clone)]
pub struct SubmissionGate {
    categories: Arc<dyn CategoryDirectory>,
    store: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    policy: SubmissionPolicy,
}

impl SubmissionGate {
    pub fn new(
        categories: Arc<dyn CategoryDirectory>,
        store: Arc<dyn SubmissionStore>,
        clock: Arc<dyn Clock>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            categories,
            store,
            clock,
            policy,
        }
    }

    fn window_start(&self, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let secs = now.timestamp();
        let width = self.policy.window.num_seconds();
        from_unix(secs - secs.rem_euclid(width))
    }

    /// Remaining budget for `source_hash` in the current window. Read-only.
    pub fn check_rate_limit(&self, source_hash: &str) -> Result<RateLimitStatus, SubmissionError> {
        let start = self.window_start(self.clock.now())?;
        let used = match self.store.rate_window(source_hash)? {
            Some(w) if w.window_start >= start => w.count,
            _ => 0,
        };
        let remaining = self.policy.max_per_window.saturating_sub(used);

        Ok(RateLimitStatus {
            allowed: remaining > 0,
            remaining,
            resets_at: start + self.policy.window,
        })
    }

    pub fn submit(
        &self,
        input: &SubmissionInput,
        source_hash: &str,
    ) -> Result<SubmitOutcome, SubmissionError> {
        if input.honeypot.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            debug!("suggestion discarded: honeypot filled");
            return Ok(SubmitOutcome::Discarded);
        }

        let content = input.content.trim();
        let actual = content.chars().count();
        if actual < self.policy.min_len {
            return Err(SubmissionError::TooShort {
                min_len: self.policy.min_len,
                actual,
            });
        }
        if actual > self.policy.max_len {
            return Err(SubmissionError::TooLong {
                max_len: self.policy.max_len,
                actual,
            });
        }

        let category_id = input.category_id.trim();
        if !self.categories.is_active_category(category_id)? {
            return Err(SubmissionError::InvalidCategory);
        }

        let now = self.clock.now();
        let start = self.window_start(now)?;
        let suggestion = Suggestion {
            id: Uuid::new_v4(),
            content: content.to_string(),
            category_id: category_id.to_string(),
            submitted_at: now,
        };

        match self.store.record_within_limit(
            source_hash,
            start,
            self.policy.max_per_window,
            &suggestion,
        )? {
            Some(count) => {
                info!(category = %suggestion.category_id, "suggestion stored");
                Ok(SubmitOutcome::Stored {
                    remaining: self.policy.max_per_window.saturating_sub(count),
                })
            }
            None => Err(SubmissionError::RateLimited {
                resets_at: start + self.policy.window,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_validation() {
        assert!(SubmissionPolicy::default().validate().is_ok());

        let zero = SubmissionPolicy {
            max_per_window: 0,
            ..SubmissionPolicy::default()
        };
        assert!(zero.validate().is_err());

        let inverted = SubmissionPolicy {
            min_len: 50,
            max_len: 10,
            ..SubmissionPolicy::default()
        };
        assert!(inverted.validate().is_err());
    }
}
