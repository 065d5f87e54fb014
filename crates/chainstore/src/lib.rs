// Path: crates/chainstore/src/lib.rs
#![forbid(unsafe_code)]

//! # Quill Chain Store
//!
//! PKI signers publish their end-entity → intermediate → root certificate
//! chain to a location named by configuration; verifiers retrieve it via
//! the X5U URL carried in signature responses. Two upload schemes sit
//! behind one trait: `s3://bucket/prefix/` and `file:///absolute/path/`.

use async_trait::async_trait;
use quill_types::error::ChainError;

mod fetch;
mod file;
mod s3;
pub mod verify;

pub use fetch::fetch_chain_pem;
pub use file::FileChainStore;
pub use s3::S3ChainStore;

/// Publishes certificate chains at a deterministic name.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Uploads `body` (PEM, three certificates) under `name`.
    async fn upload(&self, name: &str, body: &[u8]) -> Result<(), ChainError>;
}

/// Builds the store for an upload location URL.
///
/// `s3://bucket/prefix/` and `file:///absolute/path/` are supported.
pub async fn store_for(location: &str) -> Result<Box<dyn ChainStore>, ChainError> {
    let parsed = url::Url::parse(location)
        .map_err(|e| ChainError::Upload(format!("bad upload location {}: {}", location, e)))?;
    match parsed.scheme() {
        "file" => Ok(Box::new(FileChainStore::new(parsed.path()))),
        "s3" => {
            let bucket = parsed
                .host_str()
                .ok_or_else(|| ChainError::Upload("s3 location lacks a bucket".into()))?
                .to_string();
            let prefix = parsed.path().trim_start_matches('/').to_string();
            Ok(Box::new(S3ChainStore::new(bucket, prefix).await))
        }
        other => Err(ChainError::Upload(format!(
            "unsupported upload scheme: {}",
            other
        ))),
    }
}
