//! Phone number normalization.
//!
//! Every phone is reduced to `+<country code><subscriber digits>` before it
//! is used as a key, so "024 123 4567", "+233 24 123 4567" and
//! "00233241234567" all address the same account.

/// Normalize `raw` to canonical E.164 form. National numbers (one leading
/// `0`) take `default_country_code`. Returns `None` for anything that does
/// not come out as 8 to 15 digits.
pub fn normalize(raw: &str, default_country_code: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = cleaned.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = cleaned.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("{}{}", default_country_code, rest)
    } else {
        cleaned
    };

    let valid = (8..=15).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0');

    valid.then(|| format!("+{}", digits))
}

/// Log-safe form of a phone number: only the last three digits survive.
pub fn mask(phone: &str) -> String {
    let tail: String = phone
        .chars()
        .rev()
        .take(3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{}", tail)
}
