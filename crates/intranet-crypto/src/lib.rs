/// Intranet Crypto Library
///
/// Small primitives shared by the login and suggestion paths:
/// - one-time code generation and digests (stored codes are never plaintext)
/// - keyed hashing of client signals, so rate limiting never sees a raw IP

pub mod otp;
pub mod source;
