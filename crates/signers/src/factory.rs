// Path: crates/signers/src/factory.rs
//! Builds concrete signers from validated configuration records.
//!
//! Construction parses key material (PEM, keyring container, or PKCS#11
//! URI), checks it against what the signer type requires, and for PKI
//! signers issues and publishes the first chain. Any failure here aborts
//! startup with a diagnostic naming the offending signer id.

use crate::apk::Apk;
use crate::backend::KeyBackend;
use crate::content_signature::ContentSignature;
use crate::content_signature_pki::ContentSignaturePki;
use crate::generic_rsa::GenericRsa;
use crate::mar::Mar;
use quill_api::{Signer, SignerDirectory};
use quill_crypto::hsm::Pkcs11Uri;
use quill_crypto::keyring;
use quill_crypto::keys::PrivateKey;
use quill_types::config::{KeyMaterial, SignerConfig};
use quill_types::error::ConfigError;
use std::sync::Arc;

/// Sessions kept per HSM-backed signer. Two absorbs bursts without holding
/// scarce token sessions open.
#[cfg(feature = "pkcs11-module")]
const HSM_POOL_SESSIONS: usize = 2;

fn invalid(id: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidSigner {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Resolves a signer's key material to a [`KeyBackend`].
async fn load_backend(config: &SignerConfig) -> Result<KeyBackend, ConfigError> {
    match &config.key {
        KeyMaterial::Inline { pem } => PrivateKey::from_pem(pem)
            .map(KeyBackend::software)
            .map_err(|e| invalid(&config.id, e)),
        KeyMaterial::File {
            file,
            passphrase_env,
        } => {
            let raw = tokio::fs::read(file)
                .await
                .map_err(|e| invalid(&config.id, format!("read {}: {}", file.display(), e)))?;
            let key = match passphrase_env {
                Some(var) => {
                    let passphrase = std::env::var(var)
                        .map_err(|_| invalid(&config.id, format!("${} is not set", var)))?;
                    let decrypted = keyring::decrypt_key(&raw, &passphrase)
                        .map_err(|e| invalid(&config.id, e))?;
                    parse_key_bytes(&decrypted.0).map_err(|e| invalid(&config.id, e))?
                }
                None => {
                    let pem = String::from_utf8(raw)
                        .map_err(|_| invalid(&config.id, "key file is not UTF-8 PEM"))?;
                    PrivateKey::from_pem(&pem).map_err(|e| invalid(&config.id, e))?
                }
            };
            Ok(KeyBackend::software(key))
        }
        KeyMaterial::Pkcs11 { pkcs11 } => {
            let uri = Pkcs11Uri::parse(pkcs11).map_err(|e| invalid(&config.id, e))?;
            build_hsm_backend(config, &uri)
        }
    }
}

/// Decrypted keyring payloads may hold either PEM text or PKCS#8 DER.
fn parse_key_bytes(bytes: &[u8]) -> Result<PrivateKey, quill_types::error::CryptoError> {
    if bytes.starts_with(b"-----") {
        let pem = std::str::from_utf8(bytes).map_err(|_| {
            quill_types::error::CryptoError::InvalidKey("PEM payload is not UTF-8".into())
        })?;
        PrivateKey::from_pem(pem)
    } else {
        PrivateKey::from_pkcs8_der(bytes)
    }
}

#[cfg(feature = "pkcs11-module")]
fn build_hsm_backend(config: &SignerConfig, uri: &Pkcs11Uri) -> Result<KeyBackend, ConfigError> {
    use quill_crypto::hsm::{pkcs11::Pkcs11Module, SessionPool};
    let module = Pkcs11Module::open(uri).map_err(|e| invalid(&config.id, e))?;
    let pool = SessionPool::new(Box::new(module), HSM_POOL_SESSIONS);
    Ok(KeyBackend::Hsm(Arc::new(pool)))
}

#[cfg(not(feature = "pkcs11-module"))]
fn build_hsm_backend(config: &SignerConfig, _uri: &Pkcs11Uri) -> Result<KeyBackend, ConfigError> {
    Err(invalid(
        &config.id,
        "key is a pkcs11: URI but this build lacks the pkcs11-module feature",
    ))
}

/// Builds one signer from its validated configuration record.
pub async fn build_signer(config: &SignerConfig) -> Result<Arc<dyn Signer>, ConfigError> {
    let backend = load_backend(config).await?;
    let signer: Arc<dyn Signer> = match config.kind.as_str() {
        "contentsignature" => Arc::new(ContentSignature::new(config.clone(), backend).await?),
        "contentsignaturepki" => Arc::new(ContentSignaturePki::new(config.clone(), backend).await?),
        "genericrsa" => Arc::new(GenericRsa::new(config.clone(), backend).await?),
        "mar" => Arc::new(Mar::new(config.clone(), backend).await?),
        "apk2" => Arc::new(Apk::new(config.clone(), backend).await?),
        other => {
            return Err(invalid(
                &config.id,
                format!("unknown signer type {}", other),
            ))
        }
    };
    Ok(signer)
}

/// Builds the whole registry. Initialization is serial per signer, so PKI
/// chain uploads happen one at a time.
pub async fn build_registry(configs: &[SignerConfig]) -> Result<SignerDirectory, ConfigError> {
    let mut signers: Vec<Arc<dyn Signer>> = Vec::with_capacity(configs.len());
    for config in configs {
        let signer = build_signer(config).await?;
        tracing::info!(
            target: "signers",
            id = %signer.id(),
            r#type = signer.kind(),
            mode = signer.mode(),
            "signer initialized"
        );
        signers.push(signer);
    }
    Ok(SignerDirectory::new(signers))
}
