// ABOUTME: Error types for the credential store and password codec.
// ABOUTME: Persistence failures carry the file path they occurred on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("key file {path} is invalid: {reason}")]
    InvalidKey { path: PathBuf, reason: String },

    #[error("failed to access key file {path}: {source}")]
    KeyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored password is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("stored password is not valid UTF-8")]
    NotUtf8,

    #[error("stored password could not be decrypted (wrong key or corrupted record)")]
    Decrypt,

    #[error("sealed password found but no key is configured")]
    MissingKey,

    #[error("password encryption failed")]
    Encrypt,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize credentials: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid credential record: {0}")]
    InvalidRecord(#[from] crate::types::TargetError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
