// ABOUTME: Error types for the session engine and its connection opener.
// ABOUTME: Separates connect, stream setup, and relay I/O failures.

use super::state::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Failure while opening and authenticating a connection. Never retried.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("authentication rejected for {0}")]
    AuthenticationRejected(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("host key rejected for {0}")]
    HostKeyRejected(String),

    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

/// Failure while opening the session channel, its pipes, or the shell.
#[derive(Debug, Error)]
pub enum PipeSetupError {
    #[error("failed to open session channel: {0}")]
    Channel(String),

    #[error("failed to connect {stream} pipe: {reason}")]
    Pipe { stream: &'static str, reason: String },

    #[error("failed to request interactive shell: {0}")]
    Shell(String),
}

/// I/O failure inside a relay task.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("writing to remote input failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("reading remote {stream} failed: {source}")]
    Read {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    PipeSetup(#[from] PipeSetupError),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session is not active (state: {0})")]
    NotActive(SessionState),

    #[error("remote input is closed")]
    InputClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
