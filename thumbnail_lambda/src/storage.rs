use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use lambda_runtime::tracing;

use crate::error::StorageError;

/// Error codes S3 uses when an upload is refused for size or quota reasons.
const QUOTA_CODES: [&str; 2] = ["EntityTooLarge", "QuotaExceeded"];

/// Raw source object as fetched from storage.
#[derive(Debug, Clone)]
pub(crate) struct ImageObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub byte_length: u64,
}

/// The slice of object storage the processor depends on.
#[async_trait]
pub(crate) trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<ImageObject, StorageError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get(&self, bucket: &str, key: &str) -> Result<ImageObject, StorageError> {
        let output = self
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(GetObjectError::NoSuchKey(_)) => StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                _ => StorageError::Transient(DisplayErrorContext(&e).to_string()),
            })?;

        let content_type = output.content_type().map(str::to_string);
        let declared_length = output.content_length();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?
            .into_bytes();
        let byte_length = declared_length
            .and_then(|len| u64::try_from(len).ok())
            .unwrap_or(bytes.len() as u64);

        tracing::debug!(bucket, key, byte_length, "Fetched source object");
        Ok(ImageObject {
            bytes,
            content_type,
            byte_length,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = body.len();
        self.put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match e.code() {
                    Some(code) if QUOTA_CODES.contains(&code) => StorageError::Quota(detail),
                    _ => StorageError::Transient(detail),
                }
            })?;
        tracing::debug!(bucket, key, size, "Stored thumbnail");
        Ok(())
    }
}
