// Path: crates/signers/src/apk.rs
//! The APK v2 file signer, shelling out to `apksigner`.
//!
//! Per invocation the signer materializes the container, the PKCS#8 key,
//! and the certificate as uniquely named temp files (content digest plus a
//! random suffix), runs the tool, and reads the rewritten container back.
//! Key material lands with mode `0400`; every exit path removes the files.

use crate::backend::KeyBackend;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quill_api::{FileSigner, SignedFile, Signer};
use quill_crypto::digest::sha256_fingerprint;
use quill_types::config::SignerConfig;
use quill_types::error::{ConfigError, SignError};
use rand::RngCore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Minimum Android SDK level for ECDSA keys (v2 scheme support).
const MIN_SDK_ECDSA: u32 = 18;
/// Minimum Android SDK level for RSA keys.
const MIN_SDK_RSA: u32 = 9;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApkOptions {
    min_sdk: Option<u32>,
}

/// Removes its temp files when dropped, covering every exit path of
/// `sign_file` including early errors and cancellation.
struct TempGuard {
    paths: Vec<PathBuf>,
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(target: "signers", path = %path.display(), error = %e, "temp cleanup failed");
                }
            }
        }
    }
}

/// An APK signer shelling out to the configured `apksigner` binary.
#[derive(Debug)]
pub struct Apk {
    config: SignerConfig,
    key_pkcs8: Zeroizing<Vec<u8>>,
    certificate: String,
    min_sdk: u32,
    tool: PathBuf,
    public_key: String,
}

impl Apk {
    /// Binds `backend` as an APK signer. The key must be software-resident
    /// (the tool consumes a PKCS#8 file) and a certificate is required.
    pub async fn new(config: SignerConfig, backend: KeyBackend) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSigner {
            id: config.id.clone(),
            reason,
        };

        let key = backend
            .software_key()
            .ok_or_else(|| invalid("apk2 requires a software key (the tool reads PKCS#8)".into()))?;
        let certificate = config
            .certificate
            .clone()
            .ok_or_else(|| invalid("apk2 requires a certificate".into()))?;

        let min_sdk_default = match key.family() {
            "rsa" => MIN_SDK_RSA,
            _ => MIN_SDK_ECDSA,
        };
        let (min_sdk, tool) = match &config.defaults {
            Some(defaults) => (
                defaults
                    .get("min_sdk")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(min_sdk_default),
                defaults
                    .get("apksigner_path")
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("apksigner")),
            ),
            None => (min_sdk_default, PathBuf::from("apksigner")),
        };

        let key_pkcs8 = Zeroizing::new(
            key.to_pkcs8_der()
                .map_err(|e| invalid(format!("key marshal failed: {}", e)))?,
        );
        let public_key = BASE64.encode(
            key.public_key_der()
                .map_err(|e| invalid(format!("public key derivation failed: {}", e)))?,
        );

        Ok(Self {
            config,
            key_pkcs8,
            certificate,
            min_sdk,
            tool,
            public_key,
        })
    }

    fn internal(&self, reason: impl std::fmt::Display) -> SignError {
        SignError::Internal {
            signer: self.config.id.clone(),
            reason: reason.to_string(),
        }
    }

    fn temp_paths(&self, file: &[u8]) -> (PathBuf, PathBuf, PathBuf) {
        // Content digest for traceability, random suffix for uniqueness
        // when identical payloads are in flight concurrently.
        let digest = sha256_fingerprint(file);
        let prefix = &digest[..16];
        let nonce = rand::thread_rng().next_u32();
        let dir = std::env::temp_dir();
        (
            dir.join(format!("quill-apk-{}-{:08x}.apk", prefix, nonce)),
            dir.join(format!("quill-apk-{}-{:08x}.pk8", prefix, nonce)),
            dir.join(format!("quill-apk-{}-{:08x}.pem", prefix, nonce)),
        )
    }
}

fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

#[async_trait]
impl FileSigner for Apk {
    async fn sign_file(
        &self,
        file: &[u8],
        options: &serde_json::Value,
    ) -> Result<SignedFile, SignError> {
        let parsed: ApkOptions =
            serde_json::from_value(options.clone()).map_err(|e| SignError::BadOptions {
                signer: self.config.id.clone(),
                reason: e.to_string(),
            })?;
        let min_sdk = parsed.min_sdk.unwrap_or(self.min_sdk);

        let (apk_path, key_path, cert_path) = self.temp_paths(file);
        let _guard = TempGuard {
            paths: vec![apk_path.clone(), key_path.clone(), cert_path.clone()],
        };

        write_with_mode(&apk_path, file, 0o644).map_err(|e| self.internal(e))?;
        write_with_mode(&key_path, &self.key_pkcs8, 0o400).map_err(|e| self.internal(e))?;
        write_with_mode(&cert_path, self.certificate.as_bytes(), 0o400)
            .map_err(|e| self.internal(e))?;

        let output = tokio::process::Command::new(&self.tool)
            .arg("sign")
            .arg("--key")
            .arg(&key_path)
            .arg("--cert")
            .arg(&cert_path)
            .arg("--min-sdk-version")
            .arg(min_sdk.to_string())
            .arg(&apk_path)
            .output()
            .await
            .map_err(|e| self.internal(format!("{} failed to start: {}", self.tool.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.chars().take(512).collect();
            return Err(self.internal(format!(
                "{} exited with {}: {}",
                self.tool.display(),
                output.status,
                snippet
            )));
        }

        let signed = tokio::fs::read(&apk_path)
            .await
            .map_err(|e| self.internal(format!("reading signed container: {}", e)))?;
        Ok(SignedFile(signed))
    }
}

#[async_trait]
impl Signer for Apk {
    fn config(&self) -> &SignerConfig {
        &self.config
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn kind(&self) -> &'static str {
        "apk2"
    }

    fn public_key(&self) -> Option<String> {
        Some(self.public_key.clone())
    }

    fn defaults(&self) -> serde_json::Value {
        serde_json::json!({ "min_sdk": self.min_sdk })
    }

    fn as_file_signer(&self) -> Option<&dyn FileSigner> {
        Some(self)
    }
}

#[cfg(test)]
mod tests;
