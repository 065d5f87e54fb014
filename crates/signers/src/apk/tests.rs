// Path: crates/signers/src/apk/tests.rs
#![cfg(unix)]

use super::*;
use crate::testutil::test_config;
use quill_crypto::keys::PrivateKey;
use rand::rngs::OsRng;
use std::os::unix::fs::PermissionsExt;

fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("apksigner");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn apk_config(tool: &Path, min_sdk: Option<u32>) -> SignerConfig {
    let cert = rcgen::generate_simple_self_signed(vec!["apk.example".into()])
        .unwrap()
        .serialize_pem()
        .unwrap();
    let mut config = test_config("apkkey1", "apk2");
    config.certificate = Some(cert);
    let mut defaults = serde_json::json!({ "apksigner_path": tool.display().to_string() });
    if let Some(sdk) = min_sdk {
        defaults["min_sdk"] = sdk.into();
    }
    config.defaults = Some(defaults);
    config
}

fn ec_backend() -> KeyBackend {
    KeyBackend::software(PrivateKey::EcdsaP256(
        p256::SecretKey::random(&mut OsRng).into(),
    ))
}

fn leftovers_for(content: &[u8]) -> usize {
    let prefix = format!("quill-apk-{}", &sha256_fingerprint(content)[..16]);
    std::fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .count()
}

#[tokio::test]
async fn shells_out_and_returns_rewritten_container() {
    let dir = tempfile::tempdir().unwrap();
    // The stand-in tool appends a marker to its last argument (the APK),
    // proving the signer reads the container back after the tool ran.
    let tool = fake_tool(
        dir.path(),
        r#"for last in "$@"; do :; done; printf SIGNED >> "$last""#,
    );
    let signer = Apk::new(apk_config(&tool, None), ec_backend()).await.unwrap();

    let content = b"unsigned apk bytes (shells_out test)";
    let signed = signer
        .sign_file(content, &serde_json::json!({}))
        .await
        .unwrap();
    assert!(signed.0.ends_with(b"SIGNED"));
    assert!(signed.0.starts_with(content));
    assert_eq!(leftovers_for(content), 0);
}

#[tokio::test]
async fn tool_failure_is_internal_and_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "echo boom >&2; exit 3");
    let signer = Apk::new(apk_config(&tool, None), ec_backend()).await.unwrap();

    let content = b"unsigned apk bytes (tool_failure test)";
    let err = signer
        .sign_file(content, &serde_json::json!({}))
        .await
        .unwrap_err();
    match err {
        SignError::Internal { signer, reason } => {
            assert_eq!(signer, "apkkey1");
            assert!(reason.contains("boom"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(leftovers_for(content), 0);
}

#[tokio::test]
async fn min_sdk_follows_key_type() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "exit 0");

    let ec = Apk::new(apk_config(&tool, None), ec_backend()).await.unwrap();
    assert_eq!(ec.defaults()["min_sdk"], 18);

    let rsa_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let rsa = Apk::new(
        apk_config(&tool, None),
        KeyBackend::software(PrivateKey::Rsa(Box::new(rsa_key))),
    )
    .await
    .unwrap();
    assert_eq!(rsa.defaults()["min_sdk"], 9);

    let pinned = Apk::new(apk_config(&tool, Some(23)), ec_backend()).await.unwrap();
    assert_eq!(pinned.defaults()["min_sdk"], 23);
}

#[tokio::test]
async fn requires_certificate() {
    let mut config = test_config("apkkey1", "apk2");
    config.certificate = None;
    let err = Apk::new(config, ec_backend()).await.unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSigner { .. }));
}

#[tokio::test]
async fn malformed_options_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "exit 0");
    let signer = Apk::new(apk_config(&tool, None), ec_backend()).await.unwrap();
    let err = signer
        .sign_file(b"apk", &serde_json::json!({ "min_sdk": "not a number" }))
        .await
        .unwrap_err();
    assert!(matches!(err, SignError::BadOptions { .. }));
}

#[tokio::test]
async fn advertises_file_capability_only() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "exit 0");
    let signer = Apk::new(apk_config(&tool, None), ec_backend()).await.unwrap();
    assert!(signer.as_file_signer().is_some());
    assert!(signer.as_data_signer().is_none());
    assert!(signer.as_hash_signer().is_none());
}
