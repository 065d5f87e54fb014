// Path: crates/crypto/src/keys.rs
//! Private-key parsing and digest signing.
//!
//! The factory hands every signer a [`PrivateKey`] parsed from PEM (SEC1,
//! PKCS#1, or PKCS#8) or DER, checks its algorithm family against what the
//! signer requires, and signs through [`PrivateKey::sign_digest`].

use crate::error::CryptoError;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey};
use sha2::{Sha256, Sha384};

/// A parsed software private key.
#[derive(Debug, Clone)]
pub enum PrivateKey {
    /// NIST P-256 key for ECDSA.
    EcdsaP256(p256::ecdsa::SigningKey),
    /// NIST P-384 key for ECDSA.
    EcdsaP384(p384::ecdsa::SigningKey),
    /// RSA key for PKCS#1 v1.5 or PSS.
    Rsa(Box<RsaPrivateKey>),
}

/// A concrete signature scheme over a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// ECDSA over P-256 with a SHA-256 digest; raw `r || s` output.
    EcdsaP256Sha256,
    /// ECDSA over P-384 with a SHA-384 digest; raw `r || s` output.
    EcdsaP384Sha384,
    /// RSASSA-PKCS1-v1_5 with a SHA-256 digest.
    RsaPkcs1Sha256,
    /// RSASSA-PKCS1-v1_5 with a SHA-384 digest.
    RsaPkcs1Sha384,
    /// RSASSA-PSS with a SHA-256 digest.
    RsaPssSha256,
}

impl SignatureScheme {
    /// The digest size this scheme signs, in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::EcdsaP256Sha256 | Self::RsaPkcs1Sha256 | Self::RsaPssSha256 => 32,
            Self::EcdsaP384Sha384 | Self::RsaPkcs1Sha384 => 48,
        }
    }
}

impl PrivateKey {
    /// Parses a PEM private key, dispatching on the PEM label.
    ///
    /// `BEGIN EC PRIVATE KEY` (SEC1) keys are tried as P-256 then P-384;
    /// `BEGIN RSA PRIVATE KEY` is PKCS#1; `BEGIN PRIVATE KEY` (PKCS#8) is
    /// tried against all three families.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let pem = pem.trim();
        if pem.contains("BEGIN EC PRIVATE KEY") {
            if let Ok(key) = p256::SecretKey::from_sec1_pem(pem) {
                return Ok(Self::EcdsaP256(key.into()));
            }
            return p384::SecretKey::from_sec1_pem(pem)
                .map(|key| Self::EcdsaP384(key.into()))
                .map_err(|e| CryptoError::InvalidKey(format!("SEC1 parse failed: {}", e)));
        }
        if pem.contains("BEGIN RSA PRIVATE KEY") {
            return RsaPrivateKey::from_pkcs1_pem(pem)
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::InvalidKey(format!("PKCS#1 parse failed: {}", e)));
        }
        if pem.contains("BEGIN PRIVATE KEY") {
            if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
                return Ok(Self::EcdsaP256(key.into()));
            }
            if let Ok(key) = p384::SecretKey::from_pkcs8_pem(pem) {
                return Ok(Self::EcdsaP384(key.into()));
            }
            return RsaPrivateKey::from_pkcs8_pem(pem)
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8 parse failed: {}", e)));
        }
        Err(CryptoError::InvalidKey(
            "no supported PEM private-key block found".into(),
        ))
    }

    /// Parses a DER PKCS#8 private key, as produced by the keyring.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::EcdsaP256(key.into()));
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::EcdsaP384(key.into()));
        }
        RsaPrivateKey::from_pkcs8_der(der)
            .map(|key| Self::Rsa(Box::new(key)))
            .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8 DER parse failed: {}", e)))
    }

    /// The algorithm family name, used in key-type mismatch diagnostics.
    pub fn family(&self) -> &'static str {
        match self {
            Self::EcdsaP256(_) => "ecdsa-p256",
            Self::EcdsaP384(_) => "ecdsa-p384",
            Self::Rsa(_) => "rsa",
        }
    }

    /// The DER-encoded SubjectPublicKeyInfo for this key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = match self {
            Self::EcdsaP256(key) => key.verifying_key().to_public_key_der(),
            Self::EcdsaP384(key) => key.verifying_key().to_public_key_der(),
            Self::Rsa(key) => key.to_public_key().to_public_key_der(),
        };
        doc.map(|d| d.into_vec())
            .map_err(|e| CryptoError::OperationFailed(format!("SPKI encode failed: {}", e)))
    }

    /// The DER-encoded PKCS#8 form of this key, for signers that must hand
    /// the key to an external tool. The caller owns zeroization.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = match self {
            Self::EcdsaP256(key) => p256::SecretKey::from(key.clone()).to_pkcs8_der(),
            Self::EcdsaP384(key) => p384::SecretKey::from(key.clone()).to_pkcs8_der(),
            Self::Rsa(key) => key.to_pkcs8_der(),
        };
        doc.map(|d| d.as_bytes().to_vec())
            .map_err(|e| CryptoError::OperationFailed(format!("PKCS#8 encode failed: {}", e)))
    }

    /// Signs an already-computed digest under `scheme`.
    ///
    /// ECDSA output is the raw fixed-size `r || s` concatenation; RSA
    /// output is the modulus-sized signature block.
    pub fn sign_digest(
        &self,
        scheme: SignatureScheme,
        digest: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if digest.len() != scheme.digest_len() {
            return Err(CryptoError::InvalidInput(format!(
                "digest length {} does not match scheme ({} expected)",
                digest.len(),
                scheme.digest_len()
            )));
        }
        match (self, scheme) {
            (Self::EcdsaP256(key), SignatureScheme::EcdsaP256Sha256) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| CryptoError::OperationFailed(format!("ECDSA sign: {}", e)))?;
                Ok(sig.to_bytes().to_vec())
            }
            (Self::EcdsaP384(key), SignatureScheme::EcdsaP384Sha384) => {
                let sig: p384::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| CryptoError::OperationFailed(format!("ECDSA sign: {}", e)))?;
                Ok(sig.to_bytes().to_vec())
            }
            (Self::Rsa(key), SignatureScheme::RsaPkcs1Sha256) => key
                .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
                .map_err(|e| CryptoError::OperationFailed(format!("RSA sign: {}", e))),
            (Self::Rsa(key), SignatureScheme::RsaPkcs1Sha384) => key
                .sign(Pkcs1v15Sign::new::<Sha384>(), digest)
                .map_err(|e| CryptoError::OperationFailed(format!("RSA sign: {}", e))),
            (Self::Rsa(key), SignatureScheme::RsaPssSha256) => key
                .sign_with_rng(&mut rand::thread_rng(), Pss::new::<Sha256>(), digest)
                .map_err(|e| CryptoError::OperationFailed(format!("RSA-PSS sign: {}", e))),
            (key, scheme) => Err(CryptoError::WrongKeyType {
                expected: scheme_family(scheme),
                got: key.family(),
            }),
        }
    }
}

fn scheme_family(scheme: SignatureScheme) -> &'static str {
    match scheme {
        SignatureScheme::EcdsaP256Sha256 => "ecdsa-p256",
        SignatureScheme::EcdsaP384Sha384 => "ecdsa-p384",
        SignatureScheme::RsaPkcs1Sha256
        | SignatureScheme::RsaPkcs1Sha384
        | SignatureScheme::RsaPssSha256 => "rsa",
    }
}

#[cfg(test)]
mod tests;
