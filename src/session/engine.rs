// ABOUTME: The interactive session engine: connect, relay, and deterministic teardown.
// ABOUTME: Owns the connection, the relay tasks, the input queue and the command history.

use super::error::{ConnectError, PipeSetupError, Result, SessionError};
use super::history::{CommandHistory, HISTORY_CAPACITY};
use super::opener::{
    ConnectRequest, Connector, OutputSink, RemoteConnection, RemoteShell, ShellPipes,
};
use super::relay::{INPUT_QUEUE_CAPACITY, RelayExit, RelaySet, input_queue};
use super::state::{CloseReason, SessionState};
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::Target;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Shows the command history instead of being sent.
pub const HISTORY_COMMAND: &str = "hist";
/// Ends the session instead of being sent.
pub const EXIT_COMMAND: &str = "exit";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on opening and authenticating the connection.
    pub connect_timeout: Duration,
    /// Pending input chunks before `submit` waits.
    pub input_capacity: usize,
    /// Commands kept for `hist`.
    pub history_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            input_capacity: INPUT_QUEUE_CAPACITY,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// What `submit` did with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Queued for the remote shell.
    Sent,
    /// `hist` was intercepted; carries the rendered history.
    History(String),
    /// `exit` was intercepted; the session is now closing.
    Exit,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub target: Option<Target>,
    pub reason: CloseReason,
    pub relays: Vec<RelayExit>,
    pub warnings: Vec<Warning>,
}

/// One live interactive session.
pub struct Session {
    config: SessionConfig,
    sink: Arc<dyn OutputSink>,
    span: tracing::Span,
    state: watch::Sender<SessionState>,
    transitions: Vec<SessionState>,
    target: Option<Target>,
    history: CommandHistory,
    connection: Option<Arc<dyn RemoteConnection>>,
    shell: Option<Box<dyn RemoteShell>>,
    input: Option<mpsc::Sender<Bytes>>,
    closing: Option<mpsc::UnboundedReceiver<CloseReason>>,
    close_reason: Option<CloseReason>,
    cancel: CancellationToken,
    relays: Option<RelaySet>,
    relays_started: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("state", &self.state())
            .field("history", &self.history)
            .finish()
    }
}

impl Session {
    pub fn new(config: SessionConfig, sink: Arc<dyn OutputSink>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let history = CommandHistory::with_capacity(config.history_capacity);
        Self {
            config,
            sink,
            span: tracing::info_span!("session"),
            state,
            transitions: vec![SessionState::Idle],
            target: None,
            history,
            connection: None,
            shell: None,
            input: None,
            closing: None,
            close_reason: None,
            cancel: CancellationToken::new(),
            relays: None,
            relays_started: 0,
        }
    }

    /// Log and instrument under `span` instead of a fresh `session` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Every state this session has been in, oldest first.
    pub fn transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Relay tasks spawned over the session's lifetime.
    pub fn relays_started(&self) -> usize {
        self.relays_started
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        tracing::debug!(parent: &self.span, from = %current, to = %next, "session transition");
        self.state.send_replace(next);
        self.transitions.push(next);
        Ok(())
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        tracing::error!(parent: &self.span, "session setup failed: {err}");
        if let Err(e) = self.transition(SessionState::Failed) {
            tracing::warn!(parent: &self.span, "{e}");
        }
        err
    }

    /// Open the connection and start relaying.
    ///
    /// Moves `Idle -> Connecting -> Authenticated -> Active`, or ends in
    /// `Failed` with nothing left open and no relay task started.
    pub async fn connect(&mut self, connector: &dyn Connector, request: ConnectRequest) -> Result<()> {
        self.transition(SessionState::Connecting)?;
        tracing::info!(parent: &self.span, "connecting to {}:{}", request.target, request.port);

        let timeout = self.config.connect_timeout;
        let connection = match tokio::time::timeout(timeout, connector.open(&request)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(_) => return Err(self.fail(ConnectError::Timeout(timeout).into())),
        };
        self.target = Some(request.target);
        self.transition(SessionState::Authenticated)?;

        let (shell, pipes) = match open_shell(connection.as_ref()).await {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::warn!(parent: &self.span, "closing connection after setup failure: {close_err}");
                }
                return Err(self.fail(e.into()));
            }
        };

        let (input_tx, input_rx) = input_queue(self.config.input_capacity);
        let (closing_tx, closing_rx) = mpsc::unbounded_channel();
        let relays = RelaySet::spawn(
            pipes,
            input_rx,
            Arc::clone(&self.sink),
            closing_tx,
            &self.cancel,
            &self.span,
        );
        self.relays_started += relays.len();

        self.connection = Some(connection);
        self.shell = Some(shell);
        self.input = Some(input_tx);
        self.closing = Some(closing_rx);
        self.relays = Some(relays);
        self.transition(SessionState::Active)?;
        tracing::info!(parent: &self.span, "session active");
        Ok(())
    }

    /// Handle one line of local input.
    ///
    /// `hist` and `exit` are answered locally. Anything else is recorded
    /// (unless blank) and queued for the remote shell, waiting for room if
    /// the queue is full.
    pub async fn submit(&mut self, line: &str) -> Result<Submission> {
        let state = self.state();
        if state != SessionState::Active {
            return Err(SessionError::NotActive(state));
        }

        match line.trim() {
            HISTORY_COMMAND => return Ok(Submission::History(self.history.display())),
            EXIT_COMMAND => {
                self.begin_close(CloseReason::UserExit)?;
                return Ok(Submission::Exit);
            }
            "" => {}
            _ => self.history.record(line),
        }

        let input = self.input.as_ref().ok_or(SessionError::InputClosed)?;
        let mut chunk = Vec::with_capacity(line.len() + 1);
        chunk.extend_from_slice(line.as_bytes());
        chunk.push(b'\n');
        input
            .send(Bytes::from(chunk))
            .await
            .map_err(|_| SessionError::InputClosed)?;
        Ok(Submission::Sent)
    }

    /// Wait until a relay task reports that the session should close, and
    /// move to `Closing`. Returns at once if closing already began.
    pub async fn wait_for_close(&mut self) -> CloseReason {
        if let Some(reason) = &self.close_reason {
            return reason.clone();
        }
        let reason = match self.closing.as_mut() {
            Some(rx) => rx.recv().await.unwrap_or(CloseReason::RemoteClosed),
            None => std::future::pending().await,
        };
        if let Err(e) = self.begin_close(reason.clone()) {
            tracing::debug!(parent: &self.span, "{e}");
        }
        reason
    }

    /// Enter `Closing`. The first recorded reason wins.
    fn begin_close(&mut self, reason: CloseReason) -> Result<()> {
        match self.state() {
            SessionState::Closing => Ok(()),
            _ => {
                self.transition(SessionState::Closing)?;
                tracing::info!(parent: &self.span, "closing session: {reason}");
                self.close_reason = Some(reason);
                Ok(())
            }
        }
    }

    /// Tear the session down and report how it ended.
    ///
    /// Cancels the relay tasks, closes the shell and the connection (each
    /// best-effort, failures become warnings), then waits for every relay
    /// task before reporting `Closed`.
    pub async fn close(&mut self, reason: CloseReason) -> Result<SessionReport> {
        self.begin_close(reason)?;
        self.cancel.cancel();
        self.input.take();

        let mut diag = Diagnostics::default();
        if let Some(shell) = self.shell.take()
            && let Err(e) = shell.close().await
        {
            diag.warn(Warning::shell_close(format!("closing shell channel failed: {e}")));
        }
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.close().await
        {
            diag.warn(Warning::connection_close(format!("closing connection failed: {e}")));
        }

        let relays = match self.relays.take() {
            Some(relays) => relays.join().await,
            None => Vec::new(),
        };
        self.closing.take();
        self.transition(SessionState::Closed)?;
        tracing::info!(parent: &self.span, "session closed");

        Ok(SessionReport {
            target: self.target.clone(),
            reason: self
                .close_reason
                .clone()
                .unwrap_or(CloseReason::UserExit),
            relays,
            warnings: diag.into_warnings(),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Relay tasks must not outlive an abandoned session.
        self.cancel.cancel();
    }
}

/// Open a session channel, take its pipes, and start the shell. On failure
/// the channel is closed again before returning.
async fn open_shell(
    connection: &dyn RemoteConnection,
) -> std::result::Result<(Box<dyn RemoteShell>, ShellPipes), PipeSetupError> {
    let mut shell = connection.new_session().await?;

    let pipes = match shell.pipes() {
        Ok(pipes) => pipes,
        Err(e) => {
            close_quietly(shell.as_ref()).await;
            return Err(e);
        }
    };

    if let Err(e) = shell.request_shell().await {
        close_quietly(shell.as_ref()).await;
        return Err(e);
    }

    Ok((shell, pipes))
}

async fn close_quietly(shell: &dyn RemoteShell) {
    if let Err(e) = shell.close().await {
        tracing::warn!("closing shell channel after setup failure: {e}");
    }
}
