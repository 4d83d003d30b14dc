//! Random credential generation and storage digests

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

/// URL-safe random token of `len` bytes
pub fn generate_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

/// Hex random token of `len` bytes, for values embedded in links
pub fn generate_hex_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token for storage (never store plain tokens)
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Digest prefix safe to put in logs
pub fn short_id(digest: &str) -> &str {
    digest.get(..8).unwrap_or(digest)
}

pub(crate) fn chrono_ttl(ttl: std::time::Duration) -> AuthResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|e| AuthError::Config(format!("TTL out of range: {}", e)))
}
