use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadulaError>;

#[derive(Error, Debug)]
pub enum RadulaError {
    #[error("Invalid canned ACL: '{0}' (expected one of: private, public-read, public-read-write, authenticated-read)")]
    InvalidAcl(String),

    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("Key not found: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transfer of {bucket}/{key} failed: {reason}")]
    Transfer {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Injected fault: {0}")]
    Injected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RadulaError {
    fn from(err: serde_json::Error) -> Self {
        RadulaError::Serialization(err.to_string())
    }
}

impl RadulaError {
    pub fn no_such_key(bucket: impl fmt::Display, key: impl fmt::Display) -> Self {
        RadulaError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RadulaError::NoSuchBucket(_) | RadulaError::NoSuchKey { .. } | RadulaError::NoSuchUpload(_)
        )
    }

    /// Errors worth retrying at the part level.
    pub fn is_transient(&self) -> bool {
        matches!(self, RadulaError::Io(_) | RadulaError::Injected(_))
    }

    pub fn error_code(&self) -> &str {
        match self {
            RadulaError::InvalidAcl(_) => "InvalidAcl",
            RadulaError::NoSuchBucket(_) => "NoSuchBucket",
            RadulaError::NoSuchKey { .. } => "NoSuchKey",
            RadulaError::NoSuchUpload(_) => "NoSuchUpload",
            RadulaError::BucketAlreadyExists(_) => "BucketAlreadyExists",
            RadulaError::BucketNotEmpty(_) => "BucketNotEmpty",
            RadulaError::InvalidPart(_) => "InvalidPart",
            RadulaError::InvalidArgument(_) => "InvalidArgument",
            RadulaError::Transfer { .. } => "TransferFailed",
            RadulaError::Cancelled => "Cancelled",
            _ => "InternalError",
        }
    }
}
