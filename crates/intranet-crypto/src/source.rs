use anyhow::{Result, anyhow};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed one-way hash of a client-identifying signal (usually the IP).
///
/// A plain SHA-256 of an IPv4 address can be reversed by enumerating the
/// address space, so the hash is an HMAC under a server-side pepper.
#[derive(Clone)]
pub struct SourceHasher {
    mac: HmacSha256,
}

impl SourceHasher {
    pub fn new(pepper: &[u8]) -> Result<Self> {
        if pepper.len() < 16 {
            return Err(anyhow!("source pepper must be at least 16 bytes"));
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(pepper)
            .map_err(|e| anyhow!("invalid source pepper: {}", e))?;
        Ok(Self { mac })
    }

    pub fn hash(&self, signal: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(signal.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for SourceHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHasher").finish_non_exhaustive()
    }
}
