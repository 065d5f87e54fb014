// Path: crates/chainstore/src/verify/tests.rs
use super::*;
use rcgen::{
    BasicConstraints, Certificate as RcgenCertificate, CertificateParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
};

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}

fn ee_params(common_name: &str, code_signing: bool) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    if code_signing {
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
    }
    params
}

struct TestPki {
    root: RcgenCertificate,
    intermediate: RcgenCertificate,
    root_pem: String,
    intermediate_pem: String,
}

fn test_pki() -> TestPki {
    let root = RcgenCertificate::from_params(ca_params("quill test root")).unwrap();
    let intermediate =
        RcgenCertificate::from_params(ca_params("quill test intermediate")).unwrap();
    let root_pem = root.serialize_pem().unwrap();
    let intermediate_pem = intermediate.serialize_pem_with_signer(&root).unwrap();
    TestPki {
        root,
        intermediate,
        root_pem,
        intermediate_pem,
    }
}

fn chain_body(pki: &TestPki, code_signing: bool) -> Vec<u8> {
    let ee = RcgenCertificate::from_params(ee_params("quill test signer", code_signing)).unwrap();
    let ee_pem = ee.serialize_pem_with_signer(&pki.intermediate).unwrap();
    format!("{}{}{}", ee_pem, pki.intermediate_pem, pki.root_pem).into_bytes()
}

fn root_fingerprint(pki: &TestPki) -> String {
    sha256_fingerprint(&pki.root.serialize_der().unwrap())
}

#[test]
fn valid_chain_verifies_with_pinned_root() {
    let pki = test_pki();
    let body = chain_body(&pki, true);
    let fingerprint = root_fingerprint(&pki);
    let verified = verify_chain_pem(
        &body,
        &ChainExpectations {
            root_hash: Some(&fingerprint),
            end_entity_spki: None,
        },
    )
    .unwrap();

    // Verifying again against the end-entity key we just parsed must hold.
    let spki = verified
        .end_entity()
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .unwrap();
    verify_chain_pem(
        &body,
        &ChainExpectations {
            root_hash: Some(&fingerprint),
            end_entity_spki: Some(&spki),
        },
    )
    .unwrap();
}

#[test]
fn two_certificates_are_malformed() {
    let pki = test_pki();
    let body = format!("{}{}", pki.intermediate_pem, pki.root_pem).into_bytes();
    let err = verify_chain_pem(&body, &ChainExpectations::default()).unwrap_err();
    assert!(matches!(err, ChainError::Malformed(_)));
}

#[test]
fn trailing_bytes_are_malformed() {
    let pki = test_pki();
    let mut body = chain_body(&pki, true);
    body.extend_from_slice(b"\ngarbage after the chain\n");
    let err = verify_chain_pem(&body, &ChainExpectations::default()).unwrap_err();
    assert!(matches!(err, ChainError::Malformed(_)));
}

#[test]
fn missing_code_signing_eku_is_untrusted() {
    let pki = test_pki();
    let body = chain_body(&pki, false);
    let err = verify_chain_pem(&body, &ChainExpectations::default()).unwrap_err();
    assert!(matches!(err, ChainError::Untrusted(_)));
}

#[test]
fn wrong_order_is_rejected() {
    let pki = test_pki();
    let ee = RcgenCertificate::from_params(ee_params("quill test signer", true)).unwrap();
    let ee_pem = ee.serialize_pem_with_signer(&pki.intermediate).unwrap();
    let body =
        format!("{}{}{}", pki.intermediate_pem, ee_pem, pki.root_pem).into_bytes();
    assert!(verify_chain_pem(&body, &ChainExpectations::default()).is_err());
}

#[test]
fn ee_signed_by_wrong_issuer_is_untrusted() {
    let pki = test_pki();
    // Signed directly by the root, but the chain presents the intermediate
    // as the issuer.
    let ee = RcgenCertificate::from_params(ee_params("quill test signer", true)).unwrap();
    let ee_pem = ee.serialize_pem_with_signer(&pki.root).unwrap();
    let body = format!("{}{}{}", ee_pem, pki.intermediate_pem, pki.root_pem).into_bytes();
    let err = verify_chain_pem(&body, &ChainExpectations::default()).unwrap_err();
    assert!(matches!(err, ChainError::Untrusted(_)));
}

#[test]
fn wrong_root_pin_is_untrusted() {
    let pki = test_pki();
    let body = chain_body(&pki, true);
    let bogus = "00".repeat(32);
    let err = verify_chain_pem(
        &body,
        &ChainExpectations {
            root_hash: Some(&bogus),
            end_entity_spki: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::Untrusted(_)));
}

#[test]
fn wrong_end_entity_key_is_untrusted() {
    let pki = test_pki();
    let body = chain_body(&pki, true);
    let other = RcgenCertificate::from_params(ee_params("other", true)).unwrap();
    let other_chain = other.serialize_pem_with_signer(&pki.intermediate).unwrap();
    let other_parsed = Certificate::load_pem_chain(other_chain.as_bytes()).unwrap();
    let other_spki = other_parsed[0]
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .unwrap();
    let err = verify_chain_pem(
        &body,
        &ChainExpectations {
            root_hash: None,
            end_entity_spki: Some(&other_spki),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::Untrusted(_)));
}
