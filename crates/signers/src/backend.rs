// Path: crates/signers/src/backend.rs
//! The key custody seam shared by all signers.
//!
//! A signer signs through a [`KeyBackend`] without knowing whether the key
//! is software-resident or lives in an HSM behind a session pool.

use quill_crypto::error::CryptoError;
use quill_crypto::hsm::SessionPool;
use quill_crypto::keys::{PrivateKey, SignatureScheme};
use std::sync::Arc;

/// A private-key handle: software key material, or an HSM session pool.
#[derive(Debug, Clone)]
pub enum KeyBackend {
    /// Software key, freely usable from concurrent requests.
    Software(Arc<PrivateKey>),
    /// HSM-resident key; all access is serialized through the pool.
    Hsm(Arc<SessionPool>),
}

impl KeyBackend {
    /// Wraps a parsed software key.
    pub fn software(key: PrivateKey) -> Self {
        Self::Software(Arc::new(key))
    }

    /// Signs an already-computed digest under `scheme`.
    pub async fn sign_digest(
        &self,
        scheme: SignatureScheme,
        digest: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Software(key) => key.sign_digest(scheme, digest),
            Self::Hsm(pool) => {
                pool.with_session(|session| session.sign_digest(scheme, digest))
                    .await
            }
        }
    }

    /// The DER SubjectPublicKeyInfo of the underlying key.
    pub async fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Software(key) => key.public_key_der(),
            Self::Hsm(pool) => pool.with_session(|session| session.public_key_der()).await,
        }
    }

    /// The key's algorithm family (`ecdsa-p256`, `ecdsa-p384`, `rsa`),
    /// derived from the public key for HSM-resident keys.
    pub async fn family(&self) -> Result<&'static str, CryptoError> {
        match self {
            Self::Software(key) => Ok(key.family()),
            Self::Hsm(_) => {
                let spki = self.public_key_der().await?;
                family_of_spki(&spki)
            }
        }
    }

    /// Liveness probe; only meaningful for HSM-backed keys.
    pub async fn probe(&self) -> Result<(), CryptoError> {
        match self {
            Self::Software(_) => Ok(()),
            Self::Hsm(pool) => pool.probe().await,
        }
    }

    /// The software key, for signers that must marshal it (PKI issuance,
    /// subprocess tools). HSM-resident keys cannot be exported.
    pub fn software_key(&self) -> Option<&PrivateKey> {
        match self {
            Self::Software(key) => Some(key),
            Self::Hsm(_) => None,
        }
    }
}

/// Classifies a DER SubjectPublicKeyInfo by algorithm family.
pub fn family_of_spki(spki: &[u8]) -> Result<&'static str, CryptoError> {
    use p256::pkcs8::DecodePublicKey as _;
    if p256::PublicKey::from_public_key_der(spki).is_ok() {
        return Ok("ecdsa-p256");
    }
    if p384::PublicKey::from_public_key_der(spki).is_ok() {
        return Ok("ecdsa-p384");
    }
    use rsa::pkcs8::DecodePublicKey as _;
    if rsa::RsaPublicKey::from_public_key_der(spki).is_ok() {
        return Ok("rsa");
    }
    Err(CryptoError::InvalidKey(
        "public key is neither P-256, P-384, nor RSA".into(),
    ))
}
