//! String Hashing
//!
//! Bit-exact hashes over UTF-16 code units so that any runtime
//! (including browser clients replaying a game) reproduces the same values:
//! - `simple_hash` seeds the deterministic RNG and shards game IDs
//! - `fnv1a_32` derives mission seeds
//! - `secret_digest` compares shared secrets without early exit on mismatch

use sha2::{Sha256, Digest};

/// SHA-256 digest output (32 bytes).
pub type SecretDigest = [u8; 32];

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;

/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 0x01000193;

/// 32-bit polynomial string hash (`h = h * 31 + c`).
///
/// Arithmetic wraps as a signed 32-bit integer; the magnitude of the final
/// value is returned.
pub fn simple_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

/// 32-bit FNV-1a hash.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for unit in input.encode_utf16() {
        hash ^= unit as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Digest a shared secret with a domain separator.
pub fn secret_digest(secret: &str) -> SecretDigest {
    let mut hasher = Sha256::new();
    hasher.update(b"GEOCONFLICT_ADMIN_V1");
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Compare two digests touching every byte.
pub fn digests_equal(a: &SecretDigest, b: &SecretDigest) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Short printable fingerprint of a secret, safe for logs.
pub fn secret_fingerprint(secret: &str) -> String {
    hex::encode(&secret_digest(secret)[..4])
}

// =============================================================================
// TESTS
// =============================================================================
