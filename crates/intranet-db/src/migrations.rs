use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (accounts, otp, suggestions)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id          TEXT PRIMARY KEY,
                phone       TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('admin', 'editor')),
                active      INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- One row per phone. Re-issuing overwrites the row in place.
            CREATE TABLE otp_codes (
                identifier          TEXT PRIMARY KEY,
                code_hash           TEXT NOT NULL,
                issued_at           INTEGER NOT NULL,
                expires_at          INTEGER NOT NULL,
                attempts_remaining  INTEGER NOT NULL,
                consumed            INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE rate_limit_windows (
                source_hash   TEXT PRIMARY KEY,
                window_start  INTEGER NOT NULL,
                count         INTEGER NOT NULL
            );

            CREATE TABLE suggestion_categories (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                active      INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- No column here may reference the submitter.
            CREATE TABLE suggestions (
                id            TEXT PRIMARY KEY,
                content       TEXT NOT NULL,
                category_id   TEXT NOT NULL REFERENCES suggestion_categories(id),
                submitted_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_suggestions_submitted
                ON suggestions(submitted_at);

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                account_id  TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                role        TEXT NOT NULL,
                issued_at   INTEGER NOT NULL,
                expires_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_sessions_expires
                ON sessions(expires_at);

            INSERT OR IGNORE INTO suggestion_categories (id, name)
                VALUES ('general', 'General');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn general_category_is_seeded() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let active: bool = conn
            .query_row(
                "SELECT active FROM suggestion_categories WHERE id = 'general'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(active);
    }
}
