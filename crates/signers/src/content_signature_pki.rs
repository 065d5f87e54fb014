// Path: crates/signers/src/content_signature_pki.rs
//! The PKI-backed content-signature signer.
//!
//! At startup the factory issues an end-entity certificate for the
//! configured key, signed by the configured intermediate, serializes the
//! full end-entity → intermediate → root chain, and publishes it to the
//! chain store. Responses carry the resulting X5U.
//!
//! The end-entity state lives behind one pointer swap: refresh issues a
//! chain for a fresh key, uploads it, then replaces the pointer. In-flight
//! signs keep the state they started with; new requests see the new one.

use crate::backend::KeyBackend;
use crate::content_signature::{digest_for, scheme_for_family, signing_input};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine as _;
use quill_api::{DataSigner, Signature, Signer};
use quill_chainstore::store_for;
use quill_crypto::digest::sha256_fingerprint;
use quill_crypto::keys::{PrivateKey, SignatureScheme};
use quill_types::config::{PkiConfig, SignerConfig};
use quill_types::error::{ConfigError, SignError};
use rand::rngs::OsRng;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

struct EndEntityState {
    key: PrivateKey,
    public_key: String,
    x5u: String,
    refresh_at: SystemTime,
}

/// A content-signature signer whose key is authenticated by a published
/// certificate chain.
#[derive(Debug)]
pub struct ContentSignaturePki {
    config: SignerConfig,
    pki: PkiConfig,
    scheme: SignatureScheme,
    mode: &'static str,
    state: RwLock<Arc<EndEntityState>>,
}

fn invalid(id: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidSigner {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn ensure_trailing_newline(pem: &str) -> String {
    let trimmed = pem.trim_end();
    format!("{}\n", trimmed)
}

/// Issues an end-entity certificate for `key`, signed by the configured
/// intermediate. Returns the PEM and DER of the new certificate.
fn issue_end_entity(
    id: &str,
    pki: &PkiConfig,
    key: &PrivateKey,
    scheme: SignatureScheme,
    validity: Duration,
) -> Result<(String, Vec<u8>), String> {
    use rcgen::{
        Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
        KeyPair, KeyUsagePurpose,
    };

    let ee_pkcs8 = key.to_pkcs8_der().map_err(|e| e.to_string())?;
    let ee_keypair = KeyPair::from_der(&ee_pkcs8).map_err(|e| format!("end-entity key: {}", e))?;
    let issuer_keypair =
        KeyPair::from_pem(&pki.issuer_key).map_err(|e| format!("issuer key: {}", e))?;
    let issuer_params = CertificateParams::from_ca_cert_pem(&pki.issuer_cert, issuer_keypair)
        .map_err(|e| format!("issuer cert: {}", e))?;
    let issuer = Certificate::from_params(issuer_params)
        .map_err(|e| format!("issuer materialize: {}", e))?;

    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, id);
    params.distinguished_name = dn;
    params.alg = match scheme {
        SignatureScheme::EcdsaP384Sha384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        _ => &rcgen::PKCS_ECDSA_P256_SHA256,
    };
    params.key_pair = Some(ee_keypair);
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(10);
    params.not_after = now
        + time::Duration::seconds(i64::try_from(validity.as_secs()).unwrap_or(i64::MAX));

    let certificate =
        Certificate::from_params(params).map_err(|e| format!("end-entity params: {}", e))?;
    let pem = certificate
        .serialize_pem_with_signer(&issuer)
        .map_err(|e| format!("end-entity sign: {}", e))?;
    let der = certificate
        .serialize_der_with_signer(&issuer)
        .map_err(|e| format!("end-entity sign: {}", e))?;
    Ok((pem, der))
}

impl ContentSignaturePki {
    /// Builds the signer, issuing and publishing its first chain.
    pub async fn new(config: SignerConfig, backend: KeyBackend) -> Result<Self, ConfigError> {
        let pki = config
            .pki
            .clone()
            .ok_or_else(|| invalid(&config.id, "contentsignaturepki requires a [signer.pki] block"))?;
        let key = backend
            .software_key()
            .ok_or_else(|| {
                invalid(
                    &config.id,
                    "contentsignaturepki requires a software key (issuance needs the private half)",
                )
            })?
            .clone();
        let (scheme, mode) = scheme_for_family(&config.id, key.family())?;
        if let Some(configured) = &config.mode {
            if configured != mode {
                return Err(invalid(
                    &config.id,
                    format!("mode {} does not match {} key", configured, key.family()),
                ));
            }
        }
        if pki.refresh_window_secs >= pki.validity_secs {
            return Err(invalid(
                &config.id,
                "refresh_window_secs must be smaller than validity_secs",
            ));
        }

        let state = materialize_chain(&config.id, &pki, key, scheme)
            .await
            .map_err(|e| invalid(&config.id, e))?;

        Ok(Self {
            config,
            pki,
            scheme,
            mode,
            state: RwLock::new(Arc::new(state)),
        })
    }

    fn current(&self) -> Arc<EndEntityState> {
        match self.state.read() {
            Ok(state) => state.clone(),
            // A poisoned lock can only mean a panic mid-swap; the old state
            // is still coherent.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether the current end-entity is inside its refresh window.
    pub fn needs_refresh(&self) -> bool {
        SystemTime::now() >= self.current().refresh_at
    }

    /// Issues, publishes, and swaps in a fresh end-entity when the current
    /// one is inside its refresh window. Returns whether a swap happened.
    ///
    /// In-flight signs hold the previous state and complete against it.
    pub async fn refresh(&self) -> Result<bool, SignError> {
        if !self.needs_refresh() {
            return Ok(false);
        }
        let fresh = match self.scheme {
            SignatureScheme::EcdsaP384Sha384 => {
                PrivateKey::EcdsaP384(p384::SecretKey::random(&mut OsRng).into())
            }
            _ => PrivateKey::EcdsaP256(p256::SecretKey::random(&mut OsRng).into()),
        };
        let state = materialize_chain(&self.config.id, &self.pki, fresh, self.scheme)
            .await
            .map_err(|e| SignError::Internal {
                signer: self.config.id.clone(),
                reason: e,
            })?;
        let x5u = state.x5u.clone();
        match self.state.write() {
            Ok(mut guard) => *guard = Arc::new(state),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(state),
        }
        tracing::info!(target: "signers", signer = %self.config.id, x5u = %x5u, "end-entity refreshed");
        Ok(true)
    }
}

/// Issues a chain for `key`, uploads it, and returns the resulting state.
async fn materialize_chain(
    id: &str,
    pki: &PkiConfig,
    key: PrivateKey,
    scheme: SignatureScheme,
) -> Result<EndEntityState, String> {
    let validity = Duration::from_secs(pki.validity_secs);
    let (ee_pem, ee_der) = issue_end_entity(id, pki, &key, scheme, validity)?;

    let mut chain = String::new();
    chain.push_str(&ensure_trailing_newline(&ee_pem));
    chain.push_str(&ensure_trailing_newline(&pki.issuer_cert));
    chain.push_str(&ensure_trailing_newline(&pki.root_cert));

    let name = format!("{}.pem", sha256_fingerprint(&ee_der));
    let store = store_for(&pki.chain_upload_location)
        .await
        .map_err(|e| e.to_string())?;
    store
        .upload(&name, chain.as_bytes())
        .await
        .map_err(|e| e.to_string())?;

    let x5u = format!("{}/{}", pki.chain_host.trim_end_matches('/'), name);
    let spki = key.public_key_der().map_err(|e| e.to_string())?;
    let refresh_at = SystemTime::now()
        + Duration::from_secs(pki.validity_secs.saturating_sub(pki.refresh_window_secs));

    Ok(EndEntityState {
        key,
        public_key: BASE64.encode(spki),
        x5u,
        refresh_at,
    })
}

#[async_trait]
impl DataSigner for ContentSignaturePki {
    async fn sign_data(
        &self,
        data: &[u8],
        _options: &serde_json::Value,
    ) -> Result<Signature, SignError> {
        let state = self.current();
        let digest = digest_for(self.scheme, &signing_input(data));
        let raw = state
            .key
            .sign_digest(self.scheme, &digest)
            .map_err(|e| SignError::Internal {
                signer: self.config.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Signature(URL_SAFE_NO_PAD.encode(raw)))
    }
}

#[async_trait]
impl Signer for ContentSignaturePki {
    fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> &'static str {
        "contentsignaturepki"
    }

    fn mode(&self) -> &str {
        self.mode
    }

    fn public_key(&self) -> Option<String> {
        Some(self.current().public_key.clone())
    }

    fn x5u(&self) -> Option<String> {
        Some(self.current().x5u.clone())
    }

    fn as_data_signer(&self) -> Option<&dyn DataSigner> {
        Some(self)
    }
}
