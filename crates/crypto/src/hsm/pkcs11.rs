// Path: crates/crypto/src/hsm/pkcs11.rs
//! Loadable-module PKCS#11 backend (feature `pkcs11-module`).
//!
//! One [`Pkcs11Module`] is built per HSM-backed signer from its parsed
//! URI. Sessions opened here are handed to the shared [`SessionPool`],
//! which owns reuse and failure policy.

use super::{HsmBackend, HsmSession};
use crate::error::CryptoError;
use crate::hsm::Pkcs11Uri;
use crate::keys::SignatureScheme;
use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::slot::Slot;
use cryptoki::types::AuthPin;
use pkcs8::EncodePublicKey;

// DigestInfo prefixes for CKM_RSA_PKCS, which signs a pre-encoded
// DigestInfo rather than hashing itself.
const DIGEST_INFO_SHA256: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];
const DIGEST_INFO_SHA384: &[u8] = &[
    0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02,
    0x05, 0x00, 0x04, 0x30,
];

/// A PKCS#11 module/token/object triple resolved from a `pkcs11:` URI.
pub struct Pkcs11Module {
    context: Pkcs11,
    slot: Slot,
    object: String,
    pin: Option<String>,
    describe: String,
}

impl Pkcs11Module {
    /// Loads the module named by `uri` and resolves its slot.
    pub fn open(uri: &Pkcs11Uri) -> Result<Self, CryptoError> {
        let module_path = uri
            .module_path
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidInput("URI lacks module-path".into()))?;
        let object = uri
            .object
            .clone()
            .ok_or_else(|| CryptoError::InvalidInput("URI lacks object".into()))?;

        let context = Pkcs11::new(module_path)
            .map_err(|e| CryptoError::HsmSession(format!("module load failed: {}", e)))?;
        context
            .initialize(CInitializeArgs::OsThreads)
            .map_err(|e| CryptoError::HsmSession(format!("initialize failed: {}", e)))?;

        let slots = context
            .get_slots_with_token()
            .map_err(|e| CryptoError::HsmSession(format!("slot enumeration failed: {}", e)))?;

        let slot = match (uri.slot_id, uri.token.as_deref()) {
            (Some(id), _) => slots
                .into_iter()
                .find(|s| s.id() == id)
                .ok_or_else(|| CryptoError::HsmSession(format!("no slot with id {}", id)))?,
            (None, Some(label)) => {
                let mut found = None;
                for s in slots {
                    let info = context.get_token_info(s).map_err(|e| {
                        CryptoError::HsmSession(format!("token info failed: {}", e))
                    })?;
                    if info.label().trim_end() == label {
                        found = Some(s);
                        break;
                    }
                }
                found.ok_or_else(|| {
                    CryptoError::HsmSession(format!("no token labelled {}", label))
                })?
            }
            (None, None) => slots
                .into_iter()
                .next()
                .ok_or_else(|| CryptoError::HsmSession("no token present".into()))?,
        };

        let describe = format!(
            "pkcs11:{}:{}",
            uri.token.as_deref().unwrap_or("<first>"),
            object
        );

        Ok(Self {
            context,
            slot,
            object,
            pin: uri.pin_value.clone(),
            describe,
        })
    }

    fn find_object(
        &self,
        session: &Session,
        class: ObjectClass,
    ) -> Result<ObjectHandle, CryptoError> {
        let template = vec![
            Attribute::Class(class),
            Attribute::Label(self.object.as_bytes().to_vec()),
        ];
        session
            .find_objects(&template)
            .map_err(|e| CryptoError::HsmSession(format!("object search failed: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CryptoError::HsmSession(format!("no {:?} object labelled {}", class, self.object))
            })
    }
}

impl HsmBackend for Pkcs11Module {
    fn open_session(&self) -> Result<Box<dyn HsmSession>, CryptoError> {
        let session = self
            .context
            .open_rw_session(self.slot)
            .map_err(|e| CryptoError::HsmSession(format!("open session failed: {}", e)))?;
        if let Some(pin) = &self.pin {
            session
                .login(UserType::User, Some(&AuthPin::new(pin.clone())))
                .map_err(|e| CryptoError::HsmSession(format!("login failed: {}", e)))?;
        }
        let private_key = self.find_object(&session, ObjectClass::PRIVATE_KEY)?;
        let public_key = self.find_object(&session, ObjectClass::PUBLIC_KEY).ok();
        Ok(Box::new(Pkcs11Session {
            session,
            private_key,
            public_key,
        }))
    }

    fn describe(&self) -> String {
        self.describe.clone()
    }
}

struct Pkcs11Session {
    session: Session,
    private_key: ObjectHandle,
    public_key: Option<ObjectHandle>,
}

impl HsmSession for Pkcs11Session {
    fn sign_digest(
        &mut self,
        scheme: SignatureScheme,
        digest: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let (mechanism, payload): (Mechanism, Vec<u8>) = match scheme {
            SignatureScheme::EcdsaP256Sha256 | SignatureScheme::EcdsaP384Sha384 => {
                (Mechanism::Ecdsa, digest.to_vec())
            }
            SignatureScheme::RsaPkcs1Sha256 => {
                let mut p = DIGEST_INFO_SHA256.to_vec();
                p.extend_from_slice(digest);
                (Mechanism::RsaPkcs, p)
            }
            SignatureScheme::RsaPkcs1Sha384 => {
                let mut p = DIGEST_INFO_SHA384.to_vec();
                p.extend_from_slice(digest);
                (Mechanism::RsaPkcs, p)
            }
            SignatureScheme::RsaPssSha256 => {
                return Err(CryptoError::Unsupported(
                    "RSA-PSS is not supported on PKCS#11 keys".into(),
                ))
            }
        };
        self.session
            .sign(&mechanism, self.private_key, &payload)
            .map_err(|e| CryptoError::HsmSession(format!("sign failed: {}", e)))
    }

    fn public_key_der(&mut self) -> Result<Vec<u8>, CryptoError> {
        let handle = self
            .public_key
            .ok_or_else(|| CryptoError::HsmSession("no public key object".into()))?;
        let attrs = self
            .session
            .get_attributes(
                handle,
                &[
                    AttributeType::Modulus,
                    AttributeType::PublicExponent,
                    AttributeType::EcPoint,
                ],
            )
            .map_err(|e| CryptoError::HsmSession(format!("attribute read failed: {}", e)))?;

        let mut modulus: Option<Vec<u8>> = None;
        let mut exponent: Option<Vec<u8>> = None;
        let mut ec_point: Option<Vec<u8>> = None;
        for attr in attrs {
            match attr {
                Attribute::Modulus(v) => modulus = Some(v),
                Attribute::PublicExponent(v) => exponent = Some(v),
                Attribute::EcPoint(v) => ec_point = Some(v),
                _ => {}
            }
        }

        if let (Some(n), Some(e)) = (modulus, exponent) {
            let key = rsa::RsaPublicKey::new(
                rsa::BigUint::from_bytes_be(&n),
                rsa::BigUint::from_bytes_be(&e),
            )
            .map_err(|e| CryptoError::InvalidKey(format!("bad RSA public key: {}", e)))?;
            return key
                .to_public_key_der()
                .map(|d| d.into_vec())
                .map_err(|e| CryptoError::OperationFailed(format!("SPKI encode: {}", e)));
        }

        if let Some(point) = ec_point {
            // CKA_EC_POINT is a DER OCTET STRING wrapping the SEC1 point.
            let sec1 = unwrap_octet_string(&point)?;
            if let Ok(key) = p256::PublicKey::from_sec1_bytes(sec1) {
                return key
                    .to_public_key_der()
                    .map(|d| d.into_vec())
                    .map_err(|e| CryptoError::OperationFailed(format!("SPKI encode: {}", e)));
            }
            return p384::PublicKey::from_sec1_bytes(sec1)
                .map_err(|e| CryptoError::InvalidKey(format!("bad EC point: {}", e)))?
                .to_public_key_der()
                .map(|d| d.into_vec())
                .map_err(|e| CryptoError::OperationFailed(format!("SPKI encode: {}", e)));
        }

        Err(CryptoError::HsmSession(
            "public key object exposes neither RSA nor EC attributes".into(),
        ))
    }
}

fn unwrap_octet_string(der: &[u8]) -> Result<&[u8], CryptoError> {
    match der {
        [0x04, len, rest @ ..] if *len < 0x80 && rest.len() == *len as usize => Ok(rest),
        [0x04, 0x81, len, rest @ ..] if rest.len() == *len as usize => Ok(rest),
        _ => Err(CryptoError::InvalidInput("bad CKA_EC_POINT encoding".into())),
    }
}
