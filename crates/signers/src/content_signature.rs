// Path: crates/signers/src/content_signature.rs
//! The content-signature data signer.
//!
//! Signs `"Content-Signature:\x00" + data` with ECDSA over P-256 or P-384.
//! The detached signature travels as URL-safe base64 without padding, the
//! one place the service departs from standard base64.

use crate::backend::KeyBackend;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine as _;
use quill_api::{DataSigner, Signature, Signer};
use quill_crypto::digest::{sha256, sha384};
use quill_crypto::keys::SignatureScheme;
use quill_types::config::SignerConfig;
use quill_types::error::{ConfigError, SignError};

/// The signing-input prefix fixed by the content-signature format.
const SIGNING_PREFIX: &[u8] = b"Content-Signature:\x00";

pub(crate) fn signing_input(data: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(SIGNING_PREFIX.len() + data.len());
    input.extend_from_slice(SIGNING_PREFIX);
    input.extend_from_slice(data);
    input
}

pub(crate) fn scheme_for_family(
    id: &str,
    family: &str,
) -> Result<(SignatureScheme, &'static str), ConfigError> {
    match family {
        "ecdsa-p256" => Ok((SignatureScheme::EcdsaP256Sha256, "p256ecdsa")),
        "ecdsa-p384" => Ok((SignatureScheme::EcdsaP384Sha384, "p384ecdsa")),
        other => Err(ConfigError::InvalidSigner {
            id: id.to_string(),
            reason: format!("content-signature requires an ECDSA key, got {}", other),
        }),
    }
}

pub(crate) fn digest_for(scheme: SignatureScheme, message: &[u8]) -> Vec<u8> {
    match scheme {
        SignatureScheme::EcdsaP384Sha384 => sha384(message).to_vec(),
        _ => sha256(message).to_vec(),
    }
}

/// A content-signature signer bound to one ECDSA key.
#[derive(Debug)]
pub struct ContentSignature {
    config: SignerConfig,
    backend: KeyBackend,
    scheme: SignatureScheme,
    mode: &'static str,
    public_key: String,
}

impl ContentSignature {
    /// Binds `backend` as a content-signature signer, rejecting non-ECDSA
    /// keys and mode/key mismatches.
    pub async fn new(config: SignerConfig, backend: KeyBackend) -> Result<Self, ConfigError> {
        let family = backend.family().await.map_err(|e| ConfigError::InvalidSigner {
            id: config.id.clone(),
            reason: e.to_string(),
        })?;
        let (scheme, mode) = scheme_for_family(&config.id, family)?;
        if let Some(configured) = &config.mode {
            if configured != mode {
                return Err(ConfigError::InvalidSigner {
                    id: config.id.clone(),
                    reason: format!("mode {} does not match {} key", configured, family),
                });
            }
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
            scheme,
            mode,
            public_key: BASE64.encode(spki),
        })
    }
}

#[async_trait]
impl DataSigner for ContentSignature {
    async fn sign_data(
        &self,
        data: &[u8],
        _options: &serde_json::Value,
    ) -> Result<Signature, SignError> {
        let digest = digest_for(self.scheme, &signing_input(data));
        let raw = self
            .backend
            .sign_digest(self.scheme, &digest)
            .await
            .map_err(|e| SignError::Internal {
                signer: self.config.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Signature(URL_SAFE_NO_PAD.encode(raw)))
    }
}

#[async_trait]
impl Signer for ContentSignature {
    fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> &'static str {
        "contentsignature"
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;
    use p256::ecdsa::signature::hazmat::PrehashVerifier;
    use quill_crypto::keys::PrivateKey;
    use rand::rngs::OsRng;

    async fn p256_signer() -> (ContentSignature, p256::ecdsa::VerifyingKey) {
        let secret = p256::SecretKey::random(&mut OsRng);
        let verifying = p256::ecdsa::SigningKey::from(secret.clone())
            .verifying_key()
            .to_owned();
        let signer = ContentSignature::new(
            test_config("appkey1", "contentsignature"),
            KeyBackend::software(PrivateKey::EcdsaP256(secret.into())),
        )
        .await
        .unwrap();
        (signer, verifying)
    }

    #[tokio::test]
    async fn signature_verifies_and_is_urlsafe() {
        let (signer, verifying) = p256_signer().await;

        let encoded = signer
            .sign_data(b"hello", &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(!encoded.0.contains('='));
        assert!(!encoded.0.contains('+'));
        assert!(!encoded.0.contains('/'));

        let raw = URL_SAFE_NO_PAD.decode(encoded.0.as_bytes()).unwrap();
        let sig = p256::ecdsa::Signature::from_slice(&raw).unwrap();
        let digest = sha256(&signing_input(b"hello"));
        verifying.verify_prehash(&digest, &sig).unwrap();
    }

    #[tokio::test]
    async fn advertises_data_capability_only() {
        let (signer, _) = p256_signer().await;
        assert!(signer.as_data_signer().is_some());
        assert!(signer.as_file_signer().is_none());
        assert!(signer.as_hash_signer().is_none());
        assert_eq!(signer.mode(), "p256ecdsa");
        assert!(signer.public_key().is_some());
    }

    #[tokio::test]
    async fn rejects_rsa_keys() {
        let rsa = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let err = ContentSignature::new(
            test_config("badkey", "contentsignature"),
            KeyBackend::software(PrivateKey::Rsa(Box::new(rsa))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigner { id, .. } if id == "badkey"));
    }

    #[tokio::test]
    async fn rejects_mode_mismatch() {
        let secret = p384::SecretKey::random(&mut OsRng);
        let mut config = test_config("p384key", "contentsignature");
        config.mode = Some("p256ecdsa".into());
        let err = ContentSignature::new(
            config,
            KeyBackend::software(PrivateKey::EcdsaP384(secret.into())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigner { .. }));
    }
}
