// Path: crates/signers/src/generic_rsa.rs
//! The generic RSA signer: data and hash capabilities, SHA-256 digests,
//! PSS by default with PKCS#1 v1.5 as an explicit mode.

use crate::backend::KeyBackend;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quill_api::{DataSigner, HashSigner, Signature, Signer};
use quill_crypto::digest::sha256;
use quill_crypto::keys::SignatureScheme;
use quill_types::config::SignerConfig;
use quill_types::error::{ConfigError, SignError};

/// An RSA signer usable from both the data and hash routes.
#[derive(Debug)]
pub struct GenericRsa {
    config: SignerConfig,
    backend: KeyBackend,
    scheme: SignatureScheme,
    mode: &'static str,
    public_key: String,
}

impl GenericRsa {
    /// Binds `backend` as a generic RSA signer, rejecting non-RSA keys and
    /// unknown modes.
    pub async fn new(config: SignerConfig, backend: KeyBackend) -> Result<Self, ConfigError> {
        let family = backend.family().await.map_err(|e| ConfigError::InvalidSigner {
            id: config.id.clone(),
            reason: e.to_string(),
        })?;
        if family != "rsa" {
            return Err(ConfigError::InvalidSigner {
                id: config.id.clone(),
                reason: format!("genericrsa requires an RSA key, got {}", family),
            });
        }
        let (scheme, mode) = match config.mode.as_deref() {
            None | Some("pss-sha256") => (SignatureScheme::RsaPssSha256, "pss-sha256"),
            Some("pkcs15-sha256") => (SignatureScheme::RsaPkcs1Sha256, "pkcs15-sha256"),
            Some(other) => {
                return Err(ConfigError::InvalidSigner {
                    id: config.id.clone(),
                    reason: format!("unknown genericrsa mode {}", other),
                })
            }
        };
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
            scheme,
            mode,
            public_key: BASE64.encode(spki),
        })
    }

    async fn sign(&self, digest: &[u8]) -> Result<Signature, SignError> {
        let raw = self
            .backend
            .sign_digest(self.scheme, digest)
            .await
            .map_err(|e| SignError::Internal {
                signer: self.config.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Signature(BASE64.encode(raw)))
    }
}

#[async_trait]
impl DataSigner for GenericRsa {
    async fn sign_data(
        &self,
        data: &[u8],
        _options: &serde_json::Value,
    ) -> Result<Signature, SignError> {
        self.sign(&sha256(data)).await
    }
}

#[async_trait]
impl HashSigner for GenericRsa {
    fn digest_len(&self) -> usize {
        self.scheme.digest_len()
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
impl Signer for GenericRsa {
    fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> &'static str {
        "genericrsa"
    }

    fn mode(&self) -> &str {
        self.mode
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
    use quill_crypto::keys::PrivateKey;
    use rand::rngs::OsRng;
    use rsa::pkcs8::DecodePublicKey;

    async fn rsa_signer(mode: Option<&str>) -> (GenericRsa, rsa::RsaPublicKey) {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = key.to_public_key();
        let mut config = test_config("rsakey1", "genericrsa");
        config.mode = mode.map(Into::into);
        let signer = GenericRsa::new(
            config,
            KeyBackend::software(PrivateKey::Rsa(Box::new(key))),
        )
        .await
        .unwrap();
        (signer, public)
    }

    #[tokio::test]
    async fn pss_data_signature_verifies() {
        let (signer, public) = rsa_signer(None).await;
        assert_eq!(signer.mode(), "pss-sha256");
        let sig = signer
            .sign_data(b"generic payload", &serde_json::Value::Null)
            .await
            .unwrap();
        let raw = BASE64.decode(sig.0.as_bytes()).unwrap();
        public
            .verify(
                rsa::Pss::new::<sha2::Sha256>(),
                &sha256(b"generic payload"),
                &raw,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn pkcs15_hash_signature_verifies() {
        let (signer, public) = rsa_signer(Some("pkcs15-sha256")).await;
        let digest = sha256(b"prehashed");
        let sig = signer
            .sign_hash(&digest, &serde_json::Value::Null)
            .await
            .unwrap();
        let raw = BASE64.decode(sig.0.as_bytes()).unwrap();
        public
            .verify(rsa::Pkcs1v15Sign::new::<sha2::Sha256>(), &digest, &raw)
            .unwrap();
    }

    #[tokio::test]
    async fn hash_route_rejects_wrong_digest_length() {
        let (signer, _) = rsa_signer(None).await;
        let err = signer
            .sign_hash(&[0u8; 20], &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignError::BadDigestLength {
                expected: 32,
                got: 20,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn rejects_ec_keys_and_unknown_modes() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let err = GenericRsa::new(
            test_config("eckey", "genericrsa"),
            KeyBackend::software(PrivateKey::EcdsaP256(secret.into())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigner { .. }));

        let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let mut config = test_config("rsakey1", "genericrsa");
        config.mode = Some("pkcs15-sha512".into());
        let err = GenericRsa::new(config, KeyBackend::software(PrivateKey::Rsa(Box::new(key))))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigner { .. }));
    }

    #[tokio::test]
    async fn advertised_public_key_parses() {
        let (signer, public) = rsa_signer(None).await;
        let spki = BASE64.decode(signer.public_key().unwrap()).unwrap();
        assert_eq!(
            rsa::RsaPublicKey::from_public_key_der(&spki).unwrap(),
            public
        );
    }
}
