// ABOUTME: SSH-specific error types.
// ABOUTME: Mapped onto the session engine's connect and pipe setup errors.

use crate::session::{ConnectError, PipeSetupError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("server host key for {0} was not accepted")]
    HostKeyRejected(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ConnectError {
    fn from(err: Error) -> Self {
        match err {
            Error::Connection(msg) => ConnectError::Unreachable(msg),
            Error::Io(e) => ConnectError::Unreachable(e.to_string()),
            Error::AuthenticationFailed(target) => ConnectError::AuthenticationRejected(target),
            Error::HostKeyRejected(host) => ConnectError::HostKeyRejected(host),
            Error::Channel(msg) => ConnectError::Protocol(msg),
            Error::Protocol(e) => ConnectError::Protocol(e.to_string()),
        }
    }
}

impl From<Error> for PipeSetupError {
    fn from(err: Error) -> Self {
        PipeSetupError::Channel(err.to_string())
    }
}
