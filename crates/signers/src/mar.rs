// Path: crates/signers/src/mar.rs
//! The MAR (Mozilla ARchive) signer.
//!
//! MAR manifests are signed with RSASSA-PKCS1-v1_5 over SHA-384; the
//! archive tooling computes the digest itself, so the hash capability is
//! the one real producers use and the data capability exists for the
//! monitor and ad-hoc callers.

use crate::backend::KeyBackend;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quill_api::{DataSigner, HashSigner, Signature, Signer};
use quill_crypto::digest::sha384;
use quill_crypto::keys::SignatureScheme;
use quill_types::config::SignerConfig;
use quill_types::error::{ConfigError, SignError};

/// A MAR signer bound to one RSA key.
#[derive(Debug)]
pub struct Mar {
    config: SignerConfig,
    backend: KeyBackend,
    public_key: String,
}

impl Mar {
    /// Binds `backend` as a MAR signer; anything but RSA is rejected.
    pub async fn new(config: SignerConfig, backend: KeyBackend) -> Result<Self, ConfigError> {
        let family = backend.family().await.map_err(|e| ConfigError::InvalidSigner {
            id: config.id.clone(),
            reason: e.to_string(),
        })?;
        if family != "rsa" {
            return Err(ConfigError::InvalidSigner {
                id: config.id.clone(),
                reason: format!("mar requires an RSA key, got {}", family),
            });
        }
        let spki = backend
            .public_key_der()
            .await
            .map_err(|e| ConfigError::InvalidSigner {
                id: config.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            config,
            backend,
            public_key: BASE64.encode(spki),
        })
    }

    async fn sign(&self, digest: &[u8]) -> Result<Signature, SignError> {
        let raw = self
            .backend
            .sign_digest(SignatureScheme::RsaPkcs1Sha384, digest)
            .await
            .map_err(|e| SignError::Internal {
                signer: self.config.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Signature(BASE64.encode(raw)))
    }
}

#[async_trait]
impl DataSigner for Mar {
    async fn sign_data(
        &self,
        data: &[u8],
        _options: &serde_json::Value,
    ) -> Result<Signature, SignError> {
        self.sign(&sha384(data)).await
    }
}

#[async_trait]
impl HashSigner for Mar {
    fn digest_len(&self) -> usize {
        SignatureScheme::RsaPkcs1Sha384.digest_len()
    }

    async fn sign_hash(
        &self,
        digest: &[u8],
        _options: &serde_json::Value,
    ) -> Result<Signature, SignError> {
        if digest.len() != self.digest_len() {
            return Err(SignError::BadDigestLength {
                signer: self.config.id.clone(),
                expected: self.digest_len(),
                got: digest.len(),
            });
        }
        self.sign(digest).await
    }
}

#[async_trait]
impl Signer for Mar {
    fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> &'static str {
        "mar"
    }

    fn public_key(&self) -> Option<String> {
        Some(self.public_key.clone())
    }

    async fn probe(&self) -> Result<(), SignError> {
        self.backend.probe().await.map_err(|e| SignError::Internal {
            signer: self.config.id.clone(),
            reason: e.to_string(),
        })
    }

    fn as_data_signer(&self) -> Option<&dyn DataSigner> {
        Some(self)
    }

    fn as_hash_signer(&self) -> Option<&dyn HashSigner> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;
    use quill_crypto::hsm::{SessionPool, SoftHsm};
    use quill_crypto::keys::PrivateKey;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    #[tokio::test]
    async fn sha384_signature_verifies() {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = key.to_public_key();
        let signer = Mar::new(
            test_config("markey1", "mar"),
            KeyBackend::software(PrivateKey::Rsa(Box::new(key))),
        )
        .await
        .unwrap();

        let sig = signer
            .sign_data(b"mar manifest", &serde_json::Value::Null)
            .await
            .unwrap();
        let raw = BASE64.decode(sig.0.as_bytes()).unwrap();
        public
            .verify(
                rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
                &sha384(b"mar manifest"),
                &raw,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn hash_route_requires_48_byte_digest() {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let signer = Mar::new(
            test_config("markey1", "mar"),
            KeyBackend::software(PrivateKey::Rsa(Box::new(key))),
        )
        .await
        .unwrap();
        assert_eq!(signer.digest_len(), 48);

        // A 32-byte digest (SHA-256 length) must be refused.
        let err = signer
            .sign_hash(&[0u8; 32], &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignError::BadDigestLength {
                expected: 48,
                got: 32,
                ..
            }
        ));

        let sig = signer
            .sign_hash(&[7u8; 48], &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(!sig.0.is_empty());
    }

    #[tokio::test]
    async fn rejects_ecdsa_keys() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let err = Mar::new(
            test_config("markey1", "mar"),
            KeyBackend::software(PrivateKey::EcdsaP256(secret.into())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigner { .. }));
    }

    #[tokio::test]
    async fn signs_through_an_hsm_backend() {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = key.to_public_key();
        let pool = SessionPool::new(
            Box::new(SoftHsm::new("markey", PrivateKey::Rsa(Box::new(key)))),
            2,
        );
        let signer = Mar::new(
            test_config("marhsm1", "mar"),
            KeyBackend::Hsm(Arc::new(pool)),
        )
        .await
        .unwrap();

        signer.probe().await.unwrap();
        let digest = sha384(b"hsm payload");
        let sig = signer
            .sign_hash(&digest, &serde_json::Value::Null)
            .await
            .unwrap();
        let raw = BASE64.decode(sig.0.as_bytes()).unwrap();
        public
            .verify(rsa::Pkcs1v15Sign::new::<sha2::Sha384>(), &digest, &raw)
            .unwrap();
    }
}
