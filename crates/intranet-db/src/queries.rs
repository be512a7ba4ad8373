use crate::Database;
use crate::models::{
    AccountRow, CategoryRow, NewOtp, NewSuggestion, OtpRow, RateWindowRow, SessionRow,
    SuggestionRow,
};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Accounts --

    pub fn create_account(
        &self,
        id: &str,
        phone: &str,
        name: &str,
        role: &str,
        active: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, phone, name, role, active) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, phone, name, role, active],
            )?;
            Ok(())
        })
    }

    /// Insert the account unless the phone is already known. Returns true if
    /// a row was created.
    pub fn ensure_account(&self, id: &str, phone: &str, name: &str, role: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO accounts (id, phone, name, role) VALUES (?1, ?2, ?3, ?4)",
                (id, phone, name, role),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn set_account_active(&self, id: &str, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET active = ?2 WHERE id = ?1",
                rusqlite::params![id, active],
            )?;
            Ok(())
        })
    }

    pub fn get_active_account_by_phone(&self, phone: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            query_account(
                conn,
                "SELECT id, phone, name, role, active FROM accounts WHERE phone = ?1 AND active = 1",
                phone,
            )
        })
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            query_account(
                conn,
                "SELECT id, phone, name, role, active FROM accounts WHERE id = ?1",
                id,
            )
        })
    }

    // -- OTP codes --

    /// Write a fresh code for the identifier, replacing any earlier one,
    /// unless the earlier one was issued after `cooldown_cutoff`.
    ///
    /// Check and overwrite are one conditional upsert, so two concurrent
    /// requests for the same phone cannot both pass the cooldown. Returns
    /// false when the cooldown blocked the write.
    pub fn issue_otp(&self, otp: &NewOtp<'_>, cooldown_cutoff: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let written: Option<String> = conn
                .query_row(
                    "INSERT INTO otp_codes
                        (identifier, code_hash, issued_at, expires_at, attempts_remaining, consumed)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)
                     ON CONFLICT(identifier) DO UPDATE SET
                        code_hash = excluded.code_hash,
                        issued_at = excluded.issued_at,
                        expires_at = excluded.expires_at,
                        attempts_remaining = excluded.attempts_remaining,
                        consumed = 0
                     WHERE otp_codes.issued_at <= ?6
                     RETURNING identifier",
                    rusqlite::params![
                        otp.identifier,
                        otp.code_hash,
                        otp.issued_at,
                        otp.expires_at,
                        otp.attempts,
                        cooldown_cutoff
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(written.is_some())
        })
    }

    pub fn get_otp(&self, identifier: &str) -> Result<Option<OtpRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT identifier, code_hash, issued_at, expires_at, attempts_remaining, consumed
                 FROM otp_codes WHERE identifier = ?1",
            )?;

            let row = stmt
                .query_row([identifier], |row| {
                    Ok(OtpRow {
                        identifier: row.get(0)?,
                        code_hash: row.get(1)?,
                        issued_at: row.get(2)?,
                        expires_at: row.get(3)?,
                        attempts_remaining: row.get(4)?,
                        consumed: row.get(5)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    /// Mark the code consumed if it is live and matches. Returns true on
    /// success; a consumed code can never match again.
    pub fn consume_otp(&self, identifier: &str, code_hash: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE otp_codes SET consumed = 1
                 WHERE identifier = ?1
                   AND code_hash = ?2
                   AND consumed = 0
                   AND attempts_remaining > 0
                   AND expires_at > ?3",
                rusqlite::params![identifier, code_hash, now],
            )?;
            Ok(changed == 1)
        })
    }

    /// Burn one attempt on a live code. Returns the attempts left afterwards,
    /// or `None` if there was no live code to burn an attempt on.
    pub fn spend_otp_attempt(&self, identifier: &str, now: i64) -> Result<Option<u32>> {
        self.with_conn(|conn| {
            let left = conn
                .query_row(
                    "UPDATE otp_codes SET attempts_remaining = attempts_remaining - 1
                     WHERE identifier = ?1
                       AND consumed = 0
                       AND attempts_remaining > 0
                       AND expires_at > ?2
                     RETURNING attempts_remaining",
                    rusqlite::params![identifier, now],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(left)
        })
    }

    pub fn delete_expired_otps(&self, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM otp_codes WHERE expires_at <= ?1", [now])?;
            Ok(n)
        })
    }

    // -- Rate-limit windows --

    pub fn get_rate_window(&self, source_hash: &str) -> Result<Option<RateWindowRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT source_hash, window_start, count FROM rate_limit_windows WHERE source_hash = ?1",
                    [source_hash],
                    |row| {
                        Ok(RateWindowRow {
                            source_hash: row.get(0)?,
                            window_start: row.get(1)?,
                            count: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Take one slot in the source's window and store the suggestion, in one
    /// transaction. Returns the window count after the insert, or `None` if
    /// the window was already full (nothing is written in that case).
    pub fn insert_suggestion_within_limit(
        &self,
        source_hash: &str,
        window_start: i64,
        max_per_window: u32,
        suggestion: &NewSuggestion<'_>,
    ) -> Result<Option<u32>> {
        self.with_tx(|tx| {
            let Some(count) = take_rate_slot(tx, source_hash, window_start, max_per_window)? else {
                return Ok(None);
            };

            tx.execute(
                "INSERT INTO suggestions (id, content, category_id, submitted_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    suggestion.id,
                    suggestion.content,
                    suggestion.category_id,
                    suggestion.submitted_at
                ],
            )?;

            Ok(Some(count))
        })
    }

    /// Drop windows that started before `before`. Their next use would reset
    /// them anyway.
    pub fn delete_stale_rate_windows(&self, before: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM rate_limit_windows WHERE window_start < ?1", [before])?;
            Ok(n)
        })
    }

    // -- Categories --

    pub fn create_category(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO suggestion_categories (id, name) VALUES (?1, ?2)",
                (id, name),
            )?;
            Ok(())
        })
    }

    pub fn set_category_active(&self, id: &str, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE suggestion_categories SET active = ?2 WHERE id = ?1",
                rusqlite::params![id, active],
            )?;
            Ok(())
        })
    }

    pub fn is_active_category(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let active = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM suggestion_categories WHERE id = ?1 AND active = 1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(active)
        })
    }

    pub fn list_active_categories(&self) -> Result<Vec<CategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, active FROM suggestion_categories WHERE active = 1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CategoryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        active: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Suggestions --

    /// Newest first. `before` is the `(submitted_at, id)` of the last row on
    /// the previous page; rows sharing that second are ordered by id.
    pub fn list_suggestions(
        &self,
        limit: u32,
        before: Option<(i64, &str)>,
    ) -> Result<Vec<SuggestionRow>> {
        let (before_at, before_id) = before.unzip();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.content, s.category_id, c.name, s.submitted_at
                 FROM suggestions s
                 JOIN suggestion_categories c ON c.id = s.category_id
                 WHERE ?1 IS NULL OR (s.submitted_at, s.id) < (?1, ?2)
                 ORDER BY s.submitted_at DESC, s.id DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![before_at, before_id, limit], |row| {
                    Ok(SuggestionRow {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        category_id: row.get(2)?,
                        category_name: row.get(3)?,
                        submitted_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_suggestions(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM suggestions", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    // -- Sessions --

    pub fn create_session(
        &self,
        id: &str,
        account_id: &str,
        role: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, account_id, role, issued_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, account_id, role, issued_at, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, account_id, role, issued_at, expires_at FROM sessions WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(SessionRow {
                            id: row.get(0)?,
                            account_id: row.get(1)?,
                            role: row.get(2)?,
                            issued_at: row.get(3)?,
                            expires_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn delete_expired_sessions(&self, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?;
            Ok(n)
        })
    }
}

/// Check-and-increment on the source's fixed window.
///
/// A row from an older window is reset to this window with count 1; a row in
/// this window is incremented only while below `max`. When the window is
/// full the upsert's WHERE fails, nothing changes and no row is returned.
fn take_rate_slot(
    conn: &Connection,
    source_hash: &str,
    window_start: i64,
    max: u32,
) -> Result<Option<u32>> {
    let count = conn
        .query_row(
            "INSERT INTO rate_limit_windows (source_hash, window_start, count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(source_hash) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_windows.window_start < excluded.window_start THEN 1
                    ELSE rate_limit_windows.count + 1
                END,
                window_start = MAX(rate_limit_windows.window_start, excluded.window_start)
             WHERE rate_limit_windows.window_start < excluded.window_start
                OR rate_limit_windows.count < ?3
             RETURNING count",
            rusqlite::params![source_hash, window_start, max],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count)
}

fn query_account(conn: &Connection, sql: &str, key: &str) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([key], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                phone: row.get(1)?,
                name: row.get(2)?,
                role: row.get(3)?,
                active: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
