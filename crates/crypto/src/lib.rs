// Path: crates/crypto/src/lib.rs
//! # Quill Crypto Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free code. Panics are disallowed in non-test code to promote
//! robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]
//! # Quill Cryptography
//!
//! Key material handling for the Quill signing service: private-key parsing
//! (PEM / PKCS#8), digest helpers, the passphrase-encrypted keyring
//! container, and the HSM session pool.

pub mod digest;
pub mod error;
pub mod hsm;
pub mod keyring;
pub mod keys;
