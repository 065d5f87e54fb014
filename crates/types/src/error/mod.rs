// Path: crates/types/src/error/mod.rs
//! Core error types for the Quill signing service.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors detected while loading or validating the service configuration.
///
/// All of these are fatal at startup: the process refuses to serve with a
/// configuration it cannot fully resolve.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two signer records share the same identifier.
    #[error("Duplicate signer id: {0}")]
    DuplicateSigner(String),
    /// Two principal records share the same identifier.
    #[error("Duplicate principal id: {0}")]
    DuplicatePrincipal(String),
    /// An authorization entry names a signer that does not exist.
    #[error("Authorization for principal {principal} references unknown signer {signer}")]
    UnknownSigner {
        /// The principal whose authorization entry is invalid.
        principal: String,
        /// The signer id that could not be resolved.
        signer: String,
    },
    /// An authorization entry names a principal that does not exist.
    #[error("Authorization references unknown principal {0}")]
    UnknownPrincipal(String),
    /// A principal has an authorization entry with no permitted signers.
    #[error("Principal {0} has an empty signer list")]
    EmptySignerList(String),
    /// A signer record is malformed or its key material could not be used.
    #[error("Signer {id}: {reason}")]
    InvalidSigner {
        /// The offending signer id.
        id: String,
        /// A diagnostic describing what was wrong.
        reason: String,
    },
    /// A required field was missing or had an invalid value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSigner(_) => "CONFIG_DUPLICATE_SIGNER",
            Self::DuplicatePrincipal(_) => "CONFIG_DUPLICATE_PRINCIPAL",
            Self::UnknownSigner { .. } => "CONFIG_UNKNOWN_SIGNER",
            Self::UnknownPrincipal(_) => "CONFIG_UNKNOWN_PRINCIPAL",
            Self::EmptySignerList(_) => "CONFIG_EMPTY_SIGNER_LIST",
            Self::InvalidSigner { .. } => "CONFIG_INVALID_SIGNER",
            Self::Invalid(_) => "CONFIG_INVALID",
            Self::Load(_) => "CONFIG_LOAD_FAILED",
        }
    }
}

/// Errors produced while authenticating a request.
///
/// These are reported to the client as a terse category; the detailed
/// diagnostic stays in the server log.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The `Authorization` header was absent or not parseable as Hawk.
    #[error("Malformed Hawk authorization header: {0}")]
    MalformedHeader(String),
    /// The Hawk `id` did not resolve to a configured principal.
    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),
    /// The request timestamp deviated from the server clock beyond the skew.
    #[error("Request timestamp outside the allowed skew window")]
    StaleTimestamp,
    /// The recomputed request MAC did not match the `mac` attribute.
    #[error("Request MAC mismatch")]
    BadMac,
    /// The recomputed payload hash did not match the `hash` attribute.
    #[error("Payload hash mismatch")]
    BadPayloadHash,
    /// The `(principal, nonce)` pair was seen before within the replay window.
    #[error("Nonce reuse detected for principal {0}")]
    Replay(String),
    /// The principal is not permitted to invoke the requested signer.
    #[error("Principal {principal} is not authorized for signer {signer}")]
    ForbiddenSigner {
        /// The authenticated principal.
        principal: String,
        /// The signer id the request asked for.
        signer: String,
    },
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedHeader(_) => "AUTH_MALFORMED_HEADER",
            Self::UnknownPrincipal(_) => "AUTH_UNKNOWN_PRINCIPAL",
            Self::StaleTimestamp => "AUTH_STALE_TIMESTAMP",
            Self::BadMac => "AUTH_BAD_MAC",
            Self::BadPayloadHash => "AUTH_BAD_PAYLOAD_HASH",
            Self::Replay(_) => "AUTH_REPLAY",
            Self::ForbiddenSigner { .. } => "AUTH_FORBIDDEN_SIGNER",
        }
    }
}

/// Errors produced while dispatching to or invoking a signer.
#[derive(Debug, Error)]
pub enum SignError {
    /// The addressed signer does not implement the capability the route needs.
    #[error("Signer {signer} does not implement the {capability} capability")]
    CapabilityUnsupported {
        /// The addressed signer id.
        signer: String,
        /// The capability named by the route (`file`, `data`, or `hash`).
        capability: &'static str,
    },
    /// The hash route received a digest whose length does not match the
    /// signer's digest algorithm.
    #[error("Signer {signer} expects a {expected}-byte digest, got {got}")]
    BadDigestLength {
        /// The addressed signer id.
        signer: String,
        /// The digest size the signer's algorithm requires.
        expected: usize,
        /// The length of the submitted digest.
        got: usize,
    },
    /// The signer-specific options could not be parsed.
    #[error("Signer {signer}: invalid options: {reason}")]
    BadOptions {
        /// The addressed signer id.
        signer: String,
        /// A diagnostic describing the parse failure.
        reason: String,
    },
    /// The underlying cryptographic operation or subprocess failed.
    #[error("Signer {signer} failed: {reason}")]
    Internal {
        /// The addressed signer id.
        signer: String,
        /// The underlying cause, logged but not returned to clients.
        reason: String,
    },
}

impl ErrorCode for SignError {
    fn code(&self) -> &'static str {
        match self {
            Self::CapabilityUnsupported { .. } => "SIGN_CAPABILITY_UNSUPPORTED",
            Self::BadDigestLength { .. } => "SIGN_BAD_DIGEST_LENGTH",
            Self::BadOptions { .. } => "SIGN_BAD_OPTIONS",
            Self::Internal { .. } => "SIGN_INTERNAL",
        }
    }
}

/// Errors from cryptographic primitives and key handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// The parsed key has the wrong algorithm for the requesting signer.
    #[error("Wrong key type: expected {expected}, got {got}")]
    WrongKeyType {
        /// The algorithm family the signer requires.
        expected: &'static str,
        /// The algorithm family that was actually supplied.
        got: &'static str,
    },
    /// A signature could not be produced or parsed.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// The input to a primitive was structurally invalid.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A cryptographic operation failed.
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// The requested algorithm or format is not supported.
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// An HSM session could not be opened or used.
    #[error("HSM session error: {0}")]
    HsmSession(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::WrongKeyType { .. } => "CRYPTO_WRONG_KEY_TYPE",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::InvalidInput(_) => "CRYPTO_INVALID_INPUT",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
            Self::Unsupported(_) => "CRYPTO_UNSUPPORTED",
            Self::HsmSession(_) => "CRYPTO_HSM_SESSION",
        }
    }
}

/// Errors from the certificate-chain store and chain verification.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The retrieved body did not parse as exactly three PEM certificates.
    #[error("Malformed certificate chain: {0}")]
    Malformed(String),
    /// The chain did not verify to a known root, or the end-entity lacked
    /// the Code-Signing extended key usage.
    #[error("Untrusted certificate chain: {0}")]
    Untrusted(String),
    /// The chain could not be retrieved from its X5U location.
    #[error("Certificate chain unavailable: {0}")]
    Unavailable(String),
    /// Publishing the chain to the upload location failed.
    #[error("Chain upload failed: {0}")]
    Upload(String),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "CHAIN_MALFORMED",
            Self::Untrusted(_) => "CHAIN_UNTRUSTED",
            Self::Unavailable(_) => "CHAIN_UNAVAILABLE",
            Self::Upload(_) => "CHAIN_UPLOAD_FAILED",
        }
    }
}
