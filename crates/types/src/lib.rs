// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Quill Types
//!
//! This crate is the foundational library for the Quill signing service,
//! containing all core data structures, error types, and configuration
//! objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `quill-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `SignerConfig`, `SignatureResponse`, and the
//! service-wide error enums.

/// The default tolerated deviation between a request's Hawk timestamp and
/// the server clock, in seconds.
pub const DEFAULT_MAX_SKEW_SECS: u64 = 60;
/// The default upper bound on live nonce-cache entries per process.
pub const DEFAULT_NONCE_CAPACITY: usize = 65_536;
/// The maximum number of signing tasks accepted in one request body.
pub const MAX_TASKS_PER_REQUEST: usize = 32;

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::ConfigError> = std::result::Result<T, E>;

/// Shared configuration structures (`ServiceConfig`, `SignerConfig`, …).
pub mod config;
/// A unified set of all error types used across the workspace.
pub mod error;
/// JSON request and response bodies for the signing routes.
pub mod wire;
