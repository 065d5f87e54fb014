// Path: crates/chainstore/src/s3.rs
//! Object-store chain publication.

use crate::ChainStore;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use quill_types::error::ChainError;

/// Publishes chains to `s3://bucket/prefix/` with a public-read ACL so
/// verifiers can fetch them straight from the bucket endpoint.
pub struct S3ChainStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ChainStore {
    /// A store writing under `bucket`/`prefix`. Credentials and region come
    /// from the ambient AWS environment.
    pub async fn new(bucket: String, prefix: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
            prefix,
        }
    }

    fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), name)
        }
    }
}

#[async_trait]
impl ChainStore for S3ChainStore {
    async fn upload(&self, name: &str, body: &[u8]) -> Result<(), ChainError> {
        let key = self.key_for(name);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body.to_vec()))
            .content_type("binary/octet-stream")
            .content_disposition("attachment")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                ChainError::Upload(format!("put s3://{}/{}: {}", self.bucket, key, e))
            })?;
        tracing::debug!(target: "chainstore", bucket = %self.bucket, key = %key, "chain uploaded");
        Ok(())
    }
}
