// Path: crates/crypto/src/error.rs
//! Local error types for the `quill-crypto` crate.

// Re-export the canonical error type from the types crate.
pub use quill_types::error::CryptoError;
