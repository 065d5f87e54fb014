// Path: crates/crypto/src/digest.rs
//! Digest helpers shared by signers and the Hawk authenticator.

use sha2::{Digest, Sha256, Sha384};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-384 of `data`.
pub fn sha384(data: &[u8]) -> [u8; 48] {
    Sha384::digest(data).into()
}

/// Lowercase hex SHA-256 fingerprint, as used for chain file names and
/// root pinning.
pub fn sha256_fingerprint(data: &[u8]) -> String {
    use std::fmt::Write;
    let digest = sha256(data);
    let mut out = String::with_capacity(64);
    for b in digest {
        // Writing to a String is infallible.
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha384_has_expected_length() {
        assert_eq!(sha384(b"abc").len(), 48);
    }
}
