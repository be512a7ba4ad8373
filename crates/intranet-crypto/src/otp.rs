use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of digits in a one-time code.
pub const CODE_LEN: usize = 6;

/// Generate a uniformly random numeric code, zero-padded to `CODE_LEN`.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

/// True if `code` has the shape of a one-time code. Anything else can be
/// rejected as a mismatch without looking at storage.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Digest stored in place of the code. The identifier is mixed in so equal
/// codes for different phones do not produce equal rows.
pub fn code_digest(identifier: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update([0u8]);
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
