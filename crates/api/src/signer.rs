// Path: crates/api/src/signer.rs
//! The uniform contract every signer implements.
//!
//! A signer advertises a stable `type` tag and `id`, exposes its
//! configuration, and implements a subset of the three capabilities. The
//! dispatch layer discovers capabilities structurally through the `as_*`
//! probe methods; a signer that does not implement a capability yields a
//! typed error at dispatch, never at invocation.

use async_trait::async_trait;
use quill_types::config::SignerConfig;
use quill_types::error::SignError;
use std::any::Any;

/// An encoded detached signature, ready for the response envelope.
///
/// Signers own their on-wire encoding: base64 standard for most, URL-safe
/// base64 without padding where the format dictates it (content-signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub String);

/// A (possibly rewritten) signed container returned by a file signer.
#[derive(Debug, Clone)]
pub struct SignedFile(pub Vec<u8>);

/// One of the three signing capabilities a route can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Accepts a whole container and returns a rewritten one.
    File,
    /// Accepts raw bytes; the signer decides the digest.
    Data,
    /// Accepts an already-computed digest.
    Hash,
}

impl Capability {
    /// The stable lowercase name used in error codes and route mapping.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::File => "file",
            Capability::Data => "data",
            Capability::Hash => "hash",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The base trait for any signer bound into the registry.
///
/// A signer exclusively owns its private-key handle (software) or HSM
/// session pool (hardware); its lifetime equals the process lifetime.
#[async_trait]
pub trait Signer: Any + Send + Sync {
    /// The validated configuration this signer was built from.
    fn config(&self) -> &SignerConfig;

    /// Provides access to the concrete type for downcasting (the chain
    /// refresh task needs the PKI signer behind the trait object).
    fn as_any(&self) -> &dyn Any;

    /// The signer's unique identifier.
    fn id(&self) -> &str {
        &self.config().id
    }

    /// The stable algorithm type tag (`contentsignature`, `mar`, …).
    fn kind(&self) -> &'static str;

    /// The mode discriminator within the type; empty when there is only one.
    fn mode(&self) -> &str {
        ""
    }

    /// The signer's advertised public key (base64 DER SPKI), when it
    /// publishes one.
    fn public_key(&self) -> Option<String> {
        None
    }

    /// URL of the certificate chain authenticating this signer's
    /// signatures, for PKI-backed signers.
    fn x5u(&self) -> Option<String> {
        None
    }

    /// Signer-specific default options, merged under request options.
    fn defaults(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Liveness probe for the heartbeat endpoint. Signers backed by
    /// external resources (HSM sessions, subprocess tooling) override this.
    async fn probe(&self) -> Result<(), SignError> {
        Ok(())
    }

    /// Attempts to view this signer as a `FileSigner`.
    fn as_file_signer(&self) -> Option<&dyn FileSigner> {
        None
    }

    /// Attempts to view this signer as a `DataSigner`.
    fn as_data_signer(&self) -> Option<&dyn DataSigner> {
        None
    }

    /// Attempts to view this signer as a `HashSigner`.
    fn as_hash_signer(&self) -> Option<&dyn HashSigner> {
        None
    }

    /// Convenience: does this signer implement `capability`?
    fn implements(&self, capability: Capability) -> bool {
        match capability {
            Capability::File => self.as_file_signer().is_some(),
            Capability::Data => self.as_data_signer().is_some(),
            Capability::Hash => self.as_hash_signer().is_some(),
        }
    }
}

impl std::fmt::Debug for dyn Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Signs a whole container and returns a (possibly rewritten) one.
#[async_trait]
pub trait FileSigner: Send + Sync {
    /// Signs `file`, returning the signed container.
    async fn sign_file(
        &self,
        file: &[u8],
        options: &serde_json::Value,
    ) -> Result<SignedFile, SignError>;
}

/// Signs raw bytes; the signer decides the digest.
#[async_trait]
pub trait DataSigner: Send + Sync {
    /// Signs `data`, returning the encoded detached signature.
    async fn sign_data(
        &self,
        data: &[u8],
        options: &serde_json::Value,
    ) -> Result<Signature, SignError>;
}

/// Signs an already-computed digest.
#[async_trait]
pub trait HashSigner: Send + Sync {
    /// The digest size this signer's algorithm requires, in bytes. Inputs
    /// of any other length are rejected before invocation.
    fn digest_len(&self) -> usize;

    /// Signs `digest`, returning the encoded detached signature.
    async fn sign_hash(
        &self,
        digest: &[u8],
        options: &serde_json::Value,
    ) -> Result<Signature, SignError>;
}

/// Shallow-merges request `options` over the signer's `defaults`.
///
/// Request keys win; non-object values on either side fall back to the
/// other side, with the request taking precedence.
pub fn merge_options(
    defaults: serde_json::Value,
    request: Option<&serde_json::Value>,
) -> serde_json::Value {
    match (defaults, request) {
        (d, None) => d,
        (serde_json::Value::Object(mut d), Some(serde_json::Value::Object(r))) => {
            for (k, v) in r {
                d.insert(k.clone(), v.clone());
            }
            serde_json::Value::Object(d)
        }
        (_, Some(r)) => r.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::config::{KeyMaterial, SignerConfig};

    struct DataOnly {
        config: SignerConfig,
    }

    #[async_trait]
    impl DataSigner for DataOnly {
        async fn sign_data(
            &self,
            _data: &[u8],
            _options: &serde_json::Value,
        ) -> Result<Signature, SignError> {
            Ok(Signature("sig".into()))
        }
    }

    #[async_trait]
    impl Signer for DataOnly {
        fn config(&self) -> &SignerConfig {
            &self.config
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn kind(&self) -> &'static str {
            "contentsignature"
        }
        fn as_data_signer(&self) -> Option<&dyn DataSigner> {
            Some(self)
        }
    }

    fn test_config() -> SignerConfig {
        SignerConfig {
            id: "appkey1".into(),
            kind: "contentsignature".into(),
            mode: None,
            key: KeyMaterial::Inline { pem: String::new() },
            certificate: None,
            pki: None,
            defaults: None,
        }
    }

    #[test]
    fn capability_probing_is_structural() {
        let s = DataOnly {
            config: test_config(),
        };
        assert!(s.implements(Capability::Data));
        assert!(!s.implements(Capability::File));
        assert!(!s.implements(Capability::Hash));
        assert!(s.as_file_signer().is_none());
    }

    #[test]
    fn merge_options_request_wins() {
        let defaults = serde_json::json!({"min_sdk": 18, "zip": "all"});
        let req = serde_json::json!({"min_sdk": 23});
        let merged = merge_options(defaults, Some(&req));
        assert_eq!(merged["min_sdk"], 23);
        assert_eq!(merged["zip"], "all");
    }

    #[test]
    fn merge_options_handles_missing_request() {
        let defaults = serde_json::json!({"a": 1});
        let merged = merge_options(defaults.clone(), None);
        assert_eq!(merged, defaults);
    }
}
