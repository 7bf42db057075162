// ABOUTME: The three relay tasks that move bytes between the console and the remote shell.
// ABOUTME: One writer drains the input queue; two readers forward remote lines.

use super::error::RelayError;
use super::opener::{OutputSink, RemoteReader, RemoteStream, RemoteWriter, ShellPipes};
use super::state::CloseReason;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Pending input chunks allowed before producers wait.
pub const INPUT_QUEUE_CAPACITY: usize = 10;

/// Bounded FIFO of input chunks waiting for the writer task.
pub fn input_queue(capacity: usize) -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
    mpsc::channel(capacity)
}

/// Longest line handed to the sink. Longer runs are split.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reads a byte stream as a sequence of lines.
///
/// Each line is copied out of the scan buffer, so the buffer is reused
/// between calls. Trailing `\n` or `\r\n` is stripped and invalid UTF-8 is
/// replaced rather than rejected. A line longer than [`MAX_LINE_LEN`] is
/// returned in pieces of at most that size.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::with_capacity(1024),
        }
    }

    /// Next line, or `None` at end-of-stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let mut terminated = false;
        while self.buf.len() < MAX_LINE_LEN {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            let window = &available[..available.len().min(MAX_LINE_LEN - self.buf.len())];
            match window.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.buf.extend_from_slice(&window[..i]);
                    self.inner.consume(i + 1);
                    terminated = true;
                    break;
                }
                None => {
                    let n = window.len();
                    self.buf.extend_from_slice(window);
                    self.inner.consume(n);
                }
            }
        }

        if !terminated && self.buf.is_empty() {
            return Ok(None);
        }
        if terminated && self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    InputWriter,
    OutputReader,
    ErrorReader,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayKind::InputWriter => "input-writer",
            RelayKind::OutputReader => "output-reader",
            RelayKind::ErrorReader => "error-reader",
        };
        f.write_str(name)
    }
}

/// How a relay task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Its stream or queue ended normally.
    Finished,
    /// Stopped by session teardown.
    Cancelled,
    /// Stopped by an I/O error.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayExit {
    pub kind: RelayKind,
    pub outcome: RelayOutcome,
}

/// Handles of the running relay tasks, joined on teardown.
pub(crate) struct RelaySet {
    tasks: Vec<(RelayKind, JoinHandle<RelayOutcome>)>,
}

impl RelaySet {
    pub(crate) fn spawn(
        pipes: ShellPipes,
        input: mpsc::Receiver<Bytes>,
        sink: Arc<dyn OutputSink>,
        closing: mpsc::UnboundedSender<CloseReason>,
        cancel: &CancellationToken,
        span: &tracing::Span,
    ) -> Self {
        let ShellPipes {
            stdin,
            stdout,
            stderr,
        } = pipes;

        let writer = tokio::spawn(
            input_writer(input, stdin, cancel.clone()).instrument(span.clone()),
        );
        let out = tokio::spawn(
            remote_reader(
                RemoteStream::Stdout,
                stdout,
                Arc::clone(&sink),
                closing.clone(),
                cancel.clone(),
            )
            .instrument(span.clone()),
        );
        let err = tokio::spawn(
            remote_reader(RemoteStream::Stderr, stderr, sink, closing, cancel.clone())
                .instrument(span.clone()),
        );

        Self {
            tasks: vec![
                (RelayKind::InputWriter, writer),
                (RelayKind::OutputReader, out),
                (RelayKind::ErrorReader, err),
            ],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task to return.
    pub(crate) async fn join(self) -> Vec<RelayExit> {
        let mut exits = Vec::with_capacity(self.tasks.len());
        for (kind, handle) in self.tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("{kind} task did not complete cleanly: {e}");
                    RelayOutcome::Failed(e.to_string())
                }
            };
            tracing::debug!(task = %kind, ?outcome, "relay task finished");
            exits.push(RelayExit { kind, outcome });
        }
        exits
    }
}

/// Drain queued input into the remote input stream, in order.
///
/// A write error stops the task but does not close the session; the output
/// reader notices when the remote side goes away.
async fn input_writer(
    mut queue: mpsc::Receiver<Bytes>,
    mut stdin: RemoteWriter,
    cancel: CancellationToken,
) -> RelayOutcome {
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return RelayOutcome::Cancelled,
            chunk = queue.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => return RelayOutcome::Cancelled,
            r = write_chunk(&mut stdin, &chunk) => r,
        };
        if let Err(e) = written {
            let err = RelayError::Write(e);
            tracing::error!("{err}");
            return RelayOutcome::Failed(err.to_string());
        }
        tracing::trace!(bytes = chunk.len(), "input chunk sent");
    }

    // Queue closed: let the remote side see end-of-input.
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("closing remote input failed: {e}");
    }
    RelayOutcome::Finished
}

async fn write_chunk(stdin: &mut RemoteWriter, chunk: &[u8]) -> io::Result<()> {
    stdin.write_all(chunk).await?;
    stdin.flush().await
}

/// Forward remote lines to the sink until the stream ends.
///
/// Only end-of-stream on stdout closes the session; stderr ending is
/// silent. A read error on either stream closes it.
async fn remote_reader(
    stream: RemoteStream,
    reader: RemoteReader,
    sink: Arc<dyn OutputSink>,
    closing: mpsc::UnboundedSender<CloseReason>,
    cancel: CancellationToken,
) -> RelayOutcome {
    let mut lines = LineReader::new(reader);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return RelayOutcome::Cancelled,
            next = lines.next_line() => next,
        };

        match next {
            Ok(Some(line)) => sink.remote_line(stream, &line),
            Ok(None) => {
                tracing::debug!(stream = stream.name(), "remote stream ended");
                if stream == RemoteStream::Stdout {
                    let _ = closing.send(CloseReason::RemoteClosed);
                }
                return RelayOutcome::Finished;
            }
            Err(source) => {
                let err = RelayError::Read {
                    stream: stream.name(),
                    source,
                };
                tracing::error!("{err}");
                let _ = closing.send(CloseReason::RelayFailed(err.to_string()));
                return RelayOutcome::Failed(err.to_string());
            }
        }
    }
}
