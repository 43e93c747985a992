//! Pipeline text checksums

use sha2::{Digest, Sha256, Sha512};

/// Hex-encoded SHA-256 of `data`
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex-encoded SHA-512 of `data`
#[must_use]
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Verifies `text` against a recorded digest.
///
/// The digest may be SHA-256 or SHA-512 hex, optionally followed by
/// whitespace and a file name as written by `sha256sum`. Anything else,
/// including an empty digest, fails verification.
#[must_use]
pub fn verify(text: &str, recorded: &str) -> bool {
    let Some(want) = recorded.split_whitespace().next() else {
        return false;
    };
    let want = want.to_ascii_lowercase();
    let have = match want.len() {
        64 => sha256_hex(text.as_bytes()),
        128 => sha512_hex(text.as_bytes()),
        _ => return false,
    };
    have == want
}
