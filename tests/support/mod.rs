// ABOUTME: Test support utilities.
// ABOUTME: In-memory connection opener, recording sinks, and tracing setup.

#![allow(dead_code)]

use async_trait::async_trait;
use beach::console::PasswordSource;
use beach::session::{
    ConnectError, ConnectRequest, Connector, OutputSink, PipeSetupError, RemoteConnection,
    RemoteReader, RemoteShell, RemoteStream, ShellPipes,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, DuplexStream, ReadBuf};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("beach=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Where the stub opener should fail, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
    #[default]
    None,
    /// `open` is rejected.
    Open,
    /// `open` never returns.
    Hang,
    NewSession,
    Pipes,
    RequestShell,
    /// Remote output stream fails on the first read.
    StdoutError,
    CloseShell,
    CloseConnection,
}

/// The far ends of the streams handed to the session.
pub struct RemoteEnds {
    /// Reads what the session writes to the remote input.
    pub stdin: BufReader<DuplexStream>,
    /// Writes remote output.
    pub stdout: DuplexStream,
    /// Writes remote error output.
    pub stderr: DuplexStream,
}

impl RemoteEnds {
    /// Next line the session sent, without the newline.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.stdin.read_line(&mut line))
            .await
            .expect("timed out waiting for remote input")
            .expect("reading remote input");
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_string())
    }

    pub async fn say(&mut self, line: &str) {
        self.stdout.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    /// Stop accepting remote input.
    pub fn hang_up_stdin(&mut self) {
        let (dead, _) = tokio::io::duplex(1);
        drop(std::mem::replace(&mut self.stdin, BufReader::new(dead)));
    }

    /// End the remote output stream.
    pub fn hang_up_stdout(&mut self) {
        let (dead, _) = tokio::io::duplex(1);
        drop(std::mem::replace(&mut self.stdout, dead));
    }

    pub fn hang_up_stderr(&mut self) {
        let (dead, _) = tokio::io::duplex(1);
        drop(std::mem::replace(&mut self.stderr, dead));
    }

    pub async fn complain(&mut self, line: &str) {
        self.stderr.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }
}

#[derive(Default)]
pub struct StubStats {
    pub opens: AtomicUsize,
    pub sessions: AtomicUsize,
    pub shell_closes: AtomicUsize,
    pub connection_closes: AtomicUsize,
    pub last_password: Mutex<Option<String>>,
    remote: Mutex<Option<RemoteEnds>>,
}

impl StubStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn shell_closes(&self) -> usize {
        self.shell_closes.load(Ordering::SeqCst)
    }

    pub fn connection_closes(&self) -> usize {
        self.connection_closes.load(Ordering::SeqCst)
    }

    /// Wait for a shell to hand out its pipes, then take the remote ends.
    pub async fn wait_for_remote(&self) -> RemoteEnds {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(remote) = self.remote.lock().take() {
                    return remote;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for shell pipes")
    }

    /// Take the remote ends of the most recent shell.
    pub fn take_remote(&self) -> RemoteEnds {
        self.remote.lock().take().expect("no shell pipes were opened")
    }
}

const DEFAULT_PIPE_CAPACITY: usize = 1024;

/// Connection opener backed by `tokio::io::duplex` streams.
#[derive(Clone)]
pub struct StubConnector {
    pub failure: Failure,
    pub stats: Arc<StubStats>,
    pipe_capacity: usize,
}

impl Default for StubConnector {
    fn default() -> Self {
        Self {
            failure: Failure::None,
            stats: Arc::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failure: Failure) -> Self {
        Self {
            failure,
            ..Self::default()
        }
    }

    /// Byte capacity of each in-memory pipe.
    pub fn pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Arc<dyn RemoteConnection>, ConnectError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_password.lock() = Some(request.password.expose_secret().to_string());
        match self.failure {
            Failure::Open => Err(ConnectError::AuthenticationRejected(request.target.to_string())),
            Failure::Hang => std::future::pending().await,
            _ => Ok(Arc::new(StubConnection {
                failure: self.failure,
                stats: Arc::clone(&self.stats),
                pipe_capacity: self.pipe_capacity,
            })),
        }
    }
}

struct StubConnection {
    failure: Failure,
    stats: Arc<StubStats>,
    pipe_capacity: usize,
}

#[async_trait]
impl RemoteConnection for StubConnection {
    async fn new_session(&self) -> Result<Box<dyn RemoteShell>, PipeSetupError> {
        if self.failure == Failure::NewSession {
            return Err(PipeSetupError::Channel("stub refused channel".to_string()));
        }
        self.stats.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubShell {
            failure: self.failure,
            stats: Arc::clone(&self.stats),
            pipe_capacity: self.pipe_capacity,
        }))
    }

    async fn close(&self) -> std::io::Result<()> {
        self.stats.connection_closes.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::CloseConnection {
            return Err(std::io::Error::other("stub connection close failed"));
        }
        Ok(())
    }
}

struct StubShell {
    failure: Failure,
    stats: Arc<StubStats>,
    pipe_capacity: usize,
}

/// Remote output that can only fail.
struct BrokenStream;

impl AsyncRead for BrokenStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "stub stream reset",
        )))
    }
}

#[async_trait]
impl RemoteShell for StubShell {
    fn pipes(&mut self) -> Result<ShellPipes, PipeSetupError> {
        if self.failure == Failure::Pipes {
            return Err(PipeSetupError::Pipe {
                stream: "stdout",
                reason: "stub pipe failure".to_string(),
            });
        }
        let (local_stdin, remote_stdin) = tokio::io::duplex(self.pipe_capacity);
        let (local_stdout, remote_stdout) = tokio::io::duplex(self.pipe_capacity);
        let (local_stderr, remote_stderr) = tokio::io::duplex(self.pipe_capacity);
        *self.stats.remote.lock() = Some(RemoteEnds {
            stdin: BufReader::new(remote_stdin),
            stdout: remote_stdout,
            stderr: remote_stderr,
        });
        let stdout: RemoteReader = if self.failure == Failure::StdoutError {
            Box::new(BrokenStream)
        } else {
            Box::new(local_stdout)
        };
        Ok(ShellPipes {
            stdin: Box::new(local_stdin),
            stdout,
            stderr: Box::new(local_stderr),
        })
    }

    async fn request_shell(&mut self) -> Result<(), PipeSetupError> {
        if self.failure == Failure::RequestShell {
            return Err(PipeSetupError::Shell("stub shell refused".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> std::io::Result<()> {
        self.stats.shell_closes.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::CloseShell {
            return Err(std::io::Error::other("stub shell close failed"));
        }
        Ok(())
    }
}

/// Sink that keeps every remote line.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(RemoteStream, String)>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<(RemoteStream, String)> {
        self.lines.lock().clone()
    }

    /// Poll until at least `n` lines arrived.
    pub async fn wait_for(&self, n: usize) -> Vec<(RemoteStream, String)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let lines = self.lines();
                if lines.len() >= n {
                    return lines;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for remote lines")
    }
}

impl OutputSink for RecordingSink {
    fn remote_line(&self, stream: RemoteStream, line: &str) {
        self.lines.lock().push((stream, line.to_string()));
    }
}

/// Password source that always answers the same.
pub struct FixedPassword {
    password: String,
    pub prompts: Arc<AtomicUsize>,
}

impl FixedPassword {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            prompts: Arc::default(),
        }
    }
}

#[async_trait]
impl PasswordSource for FixedPassword {
    async fn read_password(&self, _prompt: &str) -> std::io::Result<SecretString> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(SecretString::from(self.password.clone()))
    }
}

/// Cloneable in-memory writer for capturing console output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
