//! Opaque secret generation and at-rest hashing.
//!
//! Refresh tokens and password-reset tokens are never stored raw: the store
//! only sees the SHA-256 digest and lookups hash the presented value first.

use rand::{RngCore, rng};
use sha2::{Digest, Sha256};

/// Generate a 256-bit random token, hex encoded (64 chars).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
