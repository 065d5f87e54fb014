// Path: crates/chainstore/src/verify.rs
//! Retrieval-side verification of a published chain.
//!
//! The retrieved body must parse as exactly three PEM certificates
//! (end-entity, intermediate, root, in that order, no trailing bytes).
//! Verification enforces validity windows, issuer/subject linkage, the
//! Code-Signing extended key usage on the end-entity, the signature of
//! every certificate by its issuer (root self-signed), an optional pinned
//! root fingerprint, and an optional expected end-entity public key.

use der::{Decode, Encode};
use p256::ecdsa::signature::Verifier;
use quill_crypto::digest::{sha256, sha256_fingerprint};
use quill_types::error::ChainError;
use rsa::pkcs8::DecodePublicKey;
use sha2::Sha384;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::Certificate;

const OID_EXTENDED_KEY_USAGE: &str = "2.5.29.37";
const OID_KP_CODE_SIGNING: &str = "1.3.6.1.5.5.7.3.3";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";

/// What the caller knows about the chain it expects.
#[derive(Default)]
pub struct ChainExpectations<'a> {
    /// Hex SHA-256 fingerprint the root certificate's DER must match.
    pub root_hash: Option<&'a str>,
    /// DER SubjectPublicKeyInfo the end-entity must carry.
    pub end_entity_spki: Option<&'a [u8]>,
}

/// A parsed, verified chain.
pub struct VerifiedChain {
    /// End-entity, intermediate, root.
    pub certificates: [Certificate; 3],
}

impl VerifiedChain {
    /// The end-entity certificate.
    pub fn end_entity(&self) -> &Certificate {
        &self.certificates[0]
    }
}

/// Parses and verifies a PEM chain body.
pub fn verify_chain_pem(
    body: &[u8],
    expectations: &ChainExpectations<'_>,
) -> Result<VerifiedChain, ChainError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ChainError::Malformed("chain body is not UTF-8".into()))?;
    let block_count = text.matches("-----BEGIN CERTIFICATE-----").count();
    if block_count != 3 {
        return Err(ChainError::Malformed(format!(
            "expected exactly 3 certificates, found {}",
            block_count
        )));
    }
    if !text.trim_end().ends_with("-----END CERTIFICATE-----") {
        return Err(ChainError::Malformed("trailing bytes after chain".into()));
    }

    let certs = Certificate::load_pem_chain(body)
        .map_err(|e| ChainError::Malformed(format!("PEM parse failed: {}", e)))?;
    let [ee, intermediate, root]: [Certificate; 3] = certs
        .try_into()
        .map_err(|_| ChainError::Malformed("expected exactly 3 certificates".into()))?;

    for (label, cert) in [("end-entity", &ee), ("intermediate", &intermediate), ("root", &root)] {
        check_validity(label, cert)?;
    }

    check_linkage("end-entity", &ee, &intermediate)?;
    check_linkage("intermediate", &intermediate, &root)?;

    require_code_signing_eku(&ee)?;

    verify_signature("end-entity", &ee, &intermediate)?;
    verify_signature("intermediate", &intermediate, &root)?;
    verify_signature("root", &root, &root)?;

    if let Some(expected) = expectations.root_hash {
        let der = root
            .to_der()
            .map_err(|e| ChainError::Malformed(format!("root re-encode failed: {}", e)))?;
        let got = sha256_fingerprint(&der);
        if !got.eq_ignore_ascii_case(expected) {
            return Err(ChainError::Untrusted(format!(
                "root fingerprint {} does not match pinned {}",
                got, expected
            )));
        }
    }

    if let Some(expected) = expectations.end_entity_spki {
        let got = ee
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| ChainError::Malformed(format!("SPKI re-encode failed: {}", e)))?;
        if got != expected {
            return Err(ChainError::Untrusted(
                "end-entity public key does not match the signer's advertised key".into(),
            ));
        }
    }

    Ok(VerifiedChain {
        certificates: [ee, intermediate, root],
    })
}

fn check_validity(label: &str, cert: &Certificate) -> Result<(), ChainError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration();
    let not_after = validity.not_after.to_unix_duration();
    if now < not_before || now > not_after {
        return Err(ChainError::Untrusted(format!(
            "{} certificate is outside its validity window",
            label
        )));
    }
    Ok(())
}

fn check_linkage(label: &str, child: &Certificate, parent: &Certificate) -> Result<(), ChainError> {
    let issuer = child
        .tbs_certificate
        .issuer
        .to_der()
        .map_err(|e| ChainError::Malformed(format!("issuer encode failed: {}", e)))?;
    let subject = parent
        .tbs_certificate
        .subject
        .to_der()
        .map_err(|e| ChainError::Malformed(format!("subject encode failed: {}", e)))?;
    if issuer != subject {
        return Err(ChainError::Untrusted(format!(
            "{} issuer does not match its parent's subject",
            label
        )));
    }
    Ok(())
}

fn require_code_signing_eku(ee: &Certificate) -> Result<(), ChainError> {
    let extensions = ee
        .tbs_certificate
        .extensions
        .as_ref()
        .ok_or_else(|| ChainError::Untrusted("end-entity has no extensions".into()))?;
    for ext in extensions {
        if ext.extn_id.to_string() == OID_EXTENDED_KEY_USAGE {
            let eku = ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())
                .map_err(|e| ChainError::Malformed(format!("EKU parse failed: {}", e)))?;
            if eku.0.iter().any(|oid| oid.to_string() == OID_KP_CODE_SIGNING) {
                return Ok(());
            }
            return Err(ChainError::Untrusted(
                "end-entity lacks the Code-Signing extended key usage".into(),
            ));
        }
    }
    Err(ChainError::Untrusted(
        "end-entity lacks the ExtendedKeyUsage extension".into(),
    ))
}

fn verify_signature(
    label: &str,
    child: &Certificate,
    issuer: &Certificate,
) -> Result<(), ChainError> {
    let tbs = child
        .tbs_certificate
        .to_der()
        .map_err(|e| ChainError::Malformed(format!("TBS encode failed: {}", e)))?;
    let signature = child
        .signature
        .as_bytes()
        .ok_or_else(|| ChainError::Malformed("signature has unused bits".into()))?;
    let spki = issuer
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| ChainError::Malformed(format!("SPKI encode failed: {}", e)))?;

    let algorithm = child.signature_algorithm.oid.to_string();
    let verified = match algorithm.as_str() {
        OID_ECDSA_WITH_SHA256 => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki)
                .map_err(|e| ChainError::Untrusted(format!("issuer key parse: {}", e)))?;
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| ChainError::Malformed(format!("signature parse: {}", e)))?;
            key.verify(&tbs, &sig).is_ok()
        }
        OID_ECDSA_WITH_SHA384 => {
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(&spki)
                .map_err(|e| ChainError::Untrusted(format!("issuer key parse: {}", e)))?;
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| ChainError::Malformed(format!("signature parse: {}", e)))?;
            key.verify(&tbs, &sig).is_ok()
        }
        OID_SHA256_WITH_RSA => {
            let key = rsa::RsaPublicKey::from_public_key_der(&spki)
                .map_err(|e| ChainError::Untrusted(format!("issuer key parse: {}", e)))?;
            key.verify(rsa::Pkcs1v15Sign::new::<sha2::Sha256>(), &sha256(&tbs), signature)
                .is_ok()
        }
        OID_SHA384_WITH_RSA => {
            let key = rsa::RsaPublicKey::from_public_key_der(&spki)
                .map_err(|e| ChainError::Untrusted(format!("issuer key parse: {}", e)))?;
            let digest: [u8; 48] = quill_crypto::digest::sha384(&tbs);
            key.verify(rsa::Pkcs1v15Sign::new::<Sha384>(), &digest, signature)
                .is_ok()
        }
        other => {
            return Err(ChainError::Untrusted(format!(
                "unsupported signature algorithm {} on {}",
                other, label
            )))
        }
    };

    if !verified {
        return Err(ChainError::Untrusted(format!(
            "{} signature does not verify against its issuer",
            label
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
