/// Database row types — these map directly to SQLite rows.
/// Distinct from intranet-types API models to keep the DB layer independent.

pub struct AccountRow {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub role: String,
    pub active: bool,
}

pub struct OtpRow {
    pub identifier: String,
    pub code_hash: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub attempts_remaining: u32,
    pub consumed: bool,
}

pub struct RateWindowRow {
    pub source_hash: String,
    pub window_start: i64,
    pub count: u32,
}

pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub active: bool,
}

pub struct SuggestionRow {
    pub id: String,
    pub content: String,
    pub category_id: String,
    pub category_name: String,
    pub submitted_at: i64,
}

pub struct SessionRow {
    pub id: String,
    pub account_id: String,
    pub role: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A fresh OTP to write over whatever the identifier had before.
pub struct NewOtp<'a> {
    pub identifier: &'a str,
    pub code_hash: &'a str,
    pub issued_at: i64,
    pub expires_at: i64,
    pub attempts: u32,
}

pub struct NewSuggestion<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub category_id: &'a str,
    pub submitted_at: i64,
}
