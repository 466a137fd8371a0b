//! Visitor and domain identifiers.

use crate::error::{KrakensError, KrakensResult};
use sha2::{Digest, Sha256};

/// Maximum length of a domain identifier.
pub const MAX_DOMAIN_ID_LEN: usize = 64;

/// One-way hash of a caller IP. Same input, same output; the raw address is
/// never stored.
pub fn hash_ip(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

/// Domain identifiers are opaque but restricted to `[A-Za-z0-9_-]{1,64}` so
/// they can be embedded in cache keys and queue subjects without escaping.
pub fn validate_domain_id(domain_id: &str) -> KrakensResult<()> {
    if domain_id.is_empty() {
        return Err(KrakensError::BadInput("domain_id must not be empty".into()));
    }
    if domain_id.len() > MAX_DOMAIN_ID_LEN {
        return Err(KrakensError::BadInput("domain_id exceeds maximum length".into()));
    }
    if !domain_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(KrakensError::BadInput("domain_id contains invalid characters".into()));
    }
    Ok(())
}
