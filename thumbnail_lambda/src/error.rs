use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage a record was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Validate,
    DecodeKey,
    Retrieve,
    Decode,
    Resize,
    Encode,
    Write,
    Timeout,
}

impl Stage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::DecodeKey => "decode_key",
            Stage::Retrieve => "retrieve",
            Stage::Decode => "decode",
            Stage::Resize => "resize",
            Stage::Encode => "encode",
            Stage::Write => "write",
            Stage::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Startup configuration errors. These abort process initialisation.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors reported by the object storage collaborator.
#[derive(Debug, Error)]
pub(crate) enum StorageError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("storage request failed: {0}")]
    Transient(String),

    #[error("storage quota exceeded: {0}")]
    Quota(String),
}

/// Per-record failures. None of these abort the rest of the batch.
#[derive(Debug, Error)]
pub(crate) enum ThumbnailError {
    #[error("object key {0:?} is not valid percent-encoded UTF-8")]
    InvalidKeyEncoding(String),

    #[error("malformed event record: {0}")]
    MalformedRecord(&'static str),

    #[error("source object s3://{bucket}/{key} not found")]
    ObjectNotFound { bucket: String, key: String },

    #[error("failed to retrieve source object: {0}")]
    Retrieval(#[source] StorageError),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write thumbnail: {0}")]
    Write(#[source] StorageError),

    #[error("record did not finish within the invocation budget of {0:?}")]
    Timeout(Duration),

    #[error("image worker did not complete: {0}")]
    Worker(String),
}

impl ThumbnailError {
    pub(crate) fn stage(&self) -> Stage {
        match self {
            ThumbnailError::MalformedRecord(_) => Stage::Validate,
            ThumbnailError::InvalidKeyEncoding(_) => Stage::DecodeKey,
            ThumbnailError::ObjectNotFound { .. } | ThumbnailError::Retrieval(_) => Stage::Retrieve,
            ThumbnailError::Decode(_) => Stage::Decode,
            ThumbnailError::Worker(_) => Stage::Resize,
            ThumbnailError::Encode(_) => Stage::Encode,
            ThumbnailError::Write(_) => Stage::Write,
            ThumbnailError::Timeout(_) => Stage::Timeout,
        }
    }

    /// Maps a failed `get` onto the retrieval taxonomy.
    pub(crate) fn from_retrieval(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { bucket, key } => ThumbnailError::ObjectNotFound { bucket, key },
            other => ThumbnailError::Retrieval(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_object_not_found() {
        let err = ThumbnailError::from_retrieval(StorageError::NotFound {
            bucket: "uploads".to_string(),
            key: "a.jpg".to_string(),
        });
        assert!(matches!(err, ThumbnailError::ObjectNotFound { .. }));
        assert_eq!(err.stage(), Stage::Retrieve);
        assert_eq!(err.to_string(), "source object s3://uploads/a.jpg not found");
    }

    #[test]
    fn transient_maps_to_retrieval() {
        let err = ThumbnailError::from_retrieval(StorageError::Transient("throttled".to_string()));
        assert!(matches!(err, ThumbnailError::Retrieval(_)));
        assert_eq!(err.stage().to_string(), "retrieve");
    }

    #[test]
    fn malformed_records_fail_validation_not_key_decoding() {
        let malformed = ThumbnailError::MalformedRecord("missing bucket name");
        assert_eq!(malformed.stage(), Stage::Validate);
        assert_eq!(malformed.stage().to_string(), "validate");
        let encoding = ThumbnailError::InvalidKeyEncoding("bad%FF.jpg".to_string());
        assert_eq!(encoding.stage(), Stage::DecodeKey);
    }

    #[test]
    fn stages_cover_write_and_timeout() {
        let write = ThumbnailError::Write(StorageError::Quota("EntityTooLarge".to_string()));
        assert_eq!(write.stage(), Stage::Write);
        let timeout = ThumbnailError::Timeout(Duration::from_secs(3));
        assert_eq!(timeout.stage().as_str(), "timeout");
    }
}
