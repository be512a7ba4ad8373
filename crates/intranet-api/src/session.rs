use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use intranet_types::api::Claims;
use intranet_types::models::{Account, Role};

use crate::clock::Clock;
use crate::store::{AccountDirectory, SessionRecord, SessionStore};

/// An authenticated back-office session, attached to requests by
/// [`crate::middleware::require_auth`].
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: AuthSession,
}

/// Issues signed session tokens backed by a session row. Deleting the row
/// (logout) invalidates the token before its `exp`, as does deactivating the
/// account or changing its role.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    store: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(
        secret: &str,
        ttl: Duration,
        store: Arc<dyn SessionStore>,
        accounts: Arc<dyn AccountDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            store,
            accounts,
            clock,
        }
    }

    pub fn issue(&self, account: &Account) -> Result<IssuedSession> {
        let now = self.clock.now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            account_id: account.id,
            role: account.role,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.store.create(&record)?;

        let claims = Claims {
            sub: record.account_id,
            role: record.role,
            jti: record.id,
            iat: record.issued_at.timestamp() as usize,
            exp: record.expires_at.timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)?;

        Ok(IssuedSession {
            token,
            session: AuthSession {
                session_id: record.id,
                account_id: record.account_id,
                role: record.role,
                expires_at: record.expires_at,
            },
        })
    }

    /// Resolve a bearer token to its live session. `None` for a bad
    /// signature, a revoked or expired session, or an account that is no
    /// longer active in the role the session was issued for.
    pub fn authenticate(&self, token: &str) -> Result<Option<AuthSession>> {
        let Ok(data) = decode::<Claims>(token, &self.decoding_key, &Validation::default()) else {
            return Ok(None);
        };
        let claims = data.claims;

        let Some(record) = self.store.find(claims.jti)? else {
            return Ok(None);
        };
        if record.account_id != claims.sub || record.expires_at <= self.clock.now() {
            return Ok(None);
        }

        match self.accounts.find_account(record.account_id)? {
            Some(account) if account.active && account.role == record.role => {}
            _ => {
                self.store.revoke(record.id)?;
                return Ok(None);
            }
        }

        Ok(Some(AuthSession {
            session_id: record.id,
            account_id: record.account_id,
            role: record.role,
            expires_at: record.expires_at,
        }))
    }

    pub fn revoke(&self, session_id: Uuid) -> Result<bool> {
        self.store.revoke(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use intranet_db::Database;

    fn setup() -> (Arc<Database>, Arc<ManualClock>, SessionIssuer, Account) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let account = Account {
            id: Uuid::new_v4(),
            phone: "+233241234567".into(),
            name: "Ama Mensah".into(),
            role: Role::Admin,
            active: true,
        };
        db.create_account(&account.id.to_string(), &account.phone, &account.name, "admin", true)
            .unwrap();

        let clock = Arc::new(ManualClock::starting_now());
        let issuer = SessionIssuer::new(
            "test_secret_key",
            Duration::hours(12),
            db.clone(),
            db.clone(),
            clock.clone(),
        );
        (db, clock, issuer, account)
    }

    #[test]
    fn issued_token_authenticates() {
        let (_db, _clock, issuer, account) = setup();
        let issued = issuer.issue(&account).unwrap();

        let session = issuer.authenticate(&issued.token).unwrap().unwrap();
        assert_eq!(session.account_id, account.id);
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.session_id, issued.session.session_id);
    }

    #[test]
    fn revoked_session_is_rejected() {
        let (_db, _clock, issuer, account) = setup();
        let issued = issuer.issue(&account).unwrap();

        assert!(issuer.revoke(issued.session.session_id).unwrap());
        assert!(issuer.authenticate(&issued.token).unwrap().is_none());
    }

    #[test]
    fn expired_session_is_rejected() {
        let (_db, clock, issuer, account) = setup();
        let issued = issuer.issue(&account).unwrap();

        clock.advance(Duration::hours(12));
        assert!(issuer.authenticate(&issued.token).unwrap().is_none());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (db, clock, issuer, account) = setup();
        let other = SessionIssuer::new("other_secret", Duration::hours(12), db.clone(), db, clock);
        let issued = other.issue(&account).unwrap();

        assert!(issuer.authenticate(&issued.token).unwrap().is_none());
        assert!(issuer.authenticate("not-a-token").unwrap().is_none());
    }

    #[test]
    fn deactivated_account_loses_its_session() {
        let (db, _clock, issuer, account) = setup();
        let issued = issuer.issue(&account).unwrap();

        db.set_account_active(&account.id.to_string(), false).unwrap();
        assert!(issuer.authenticate(&issued.token).unwrap().is_none());

        // Reactivation does not bring the old session back.
        db.set_account_active(&account.id.to_string(), true).unwrap();
        assert!(issuer.authenticate(&issued.token).unwrap().is_none());
    }

    #[test]
    fn role_change_invalidates_session() {
        let (db, _clock, issuer, account) = setup();
        let issued = issuer.issue(&account).unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET role = 'editor' WHERE id = ?1",
                [account.id.to_string()],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(issuer.authenticate(&issued.token).unwrap().is_none());
    }
}
