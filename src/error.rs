// ABOUTME: Application-wide error types for beach.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("invalid target: {0}")]
    InvalidTarget(#[from] crate::types::TargetError),

    #[error(transparent)]
    Store(#[from] crate::credential::StoreError),

    #[error(transparent)]
    Codec(#[from] crate::credential::CodecError),

    #[error(transparent)]
    Session(#[from] crate::session::SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
