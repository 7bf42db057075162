// ABOUTME: Seams between the session engine and whatever opens the remote shell.
// ABOUTME: The SSH client implements these; tests plug in in-memory streams.

use super::error::{ConnectError, PipeSetupError};
use crate::types::Target;
use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub const DEFAULT_PORT: u16 = 22;

/// Everything needed to open one authenticated connection.
pub struct ConnectRequest {
    pub target: Target,
    /// Decoded password. Only exposed to the opener.
    pub password: SecretString,
    pub port: u16,
}

impl ConnectRequest {
    pub fn new(target: Target, password: SecretString) -> Self {
        Self {
            target,
            password,
            port: DEFAULT_PORT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("target", &self.target)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// The three byte streams of a remote shell.
pub struct ShellPipes {
    /// Local -> remote input.
    pub stdin: RemoteWriter,
    /// Remote output.
    pub stdout: RemoteReader,
    /// Remote error output.
    pub stderr: RemoteReader,
}

/// Opens authenticated connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, request: &ConnectRequest) -> Result<Arc<dyn RemoteConnection>, ConnectError>;
}

/// An open, authenticated connection.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Open a session channel on this connection.
    async fn new_session(&self) -> Result<Box<dyn RemoteShell>, PipeSetupError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self) -> std::io::Result<()>;
}

/// A session channel that can host an interactive shell.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Hand out the three streams. Called once, before `request_shell`.
    fn pipes(&mut self) -> Result<ShellPipes, PipeSetupError>;

    /// Start the remote interactive shell.
    async fn request_shell(&mut self) -> Result<(), PipeSetupError>;

    /// Release the channel. Safe to call more than once.
    async fn close(&self) -> std::io::Result<()>;
}

/// Which remote stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStream {
    Stdout,
    Stderr,
}

impl RemoteStream {
    pub fn name(self) -> &'static str {
        match self {
            RemoteStream::Stdout => "stdout",
            RemoteStream::Stderr => "stderr",
        }
    }
}

/// Receives remote lines as the relay tasks read them.
pub trait OutputSink: Send + Sync {
    fn remote_line(&self, stream: RemoteStream, line: &str);
}
