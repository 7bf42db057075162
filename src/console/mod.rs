// ABOUTME: Line-oriented console front-end: credential menu and session prompt.
// ABOUTME: Hands input lines to the session engine and renders what comes back.

mod input;
mod menu;
mod password;

pub use input::{BlockingLines, LineSource};
pub use menu::MenuChoice;
pub use password::{PasswordSource, TerminalPassword};

use crate::credential::{Credential, CredentialStore};
use crate::error::Result;
use crate::output::Output;
use crate::session::{
    CloseReason, ConnectRequest, Connector, DEFAULT_PORT, Session, SessionConfig, SessionError,
    SessionReport, Submission,
};
use crate::types::Target;
use std::sync::Arc;
use std::time::Duration;

/// Interactive front-end over a line-based input.
pub struct Console<L> {
    input: L,
    output: Output,
    passwords: Box<dyn PasswordSource>,
    session_config: SessionConfig,
    settle_delay: Duration,
    port: u16,
}

impl<L: LineSource> Console<L> {
    pub fn new(input: L, output: Output, passwords: Box<dyn PasswordSource>) -> Self {
        Self {
            input,
            output,
            passwords,
            session_config: SessionConfig::default(),
            settle_delay: Duration::from_secs(1),
            port: DEFAULT_PORT,
        }
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Pause after each sent line. Zero disables it.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Next local line without its terminator, `None` when input ends.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let line = self.input.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }

    /// Top-level loop: list stored credentials and act on the user's choice
    /// until `exit` or end of input.
    pub async fn run_menu(&mut self, store: &CredentialStore, connector: &dyn Connector) -> Result<()> {
        loop {
            // A broken store must not keep the user from a fresh login.
            let entries = match store.list() {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!("reading {}: {e}", store.path().display());
                    Vec::new()
                }
            };

            self.output.line("\nCollected shells:");
            for (i, (target, _)) in entries.iter().enumerate() {
                self.output.line(&format!("({i}) {target}"));
            }
            self.output.line("\nDo one of the following:");
            self.output.line("* Enter an option to connect to that sh via SSH (i.e. 0)");
            self.output.line("* Enter a new sh (format: username@hostname.com)");
            self.output.line("* Type `exit` to leave the beach\n");
            self.output.prompt("$ ");

            let Some(line) = self.read_line().await? else {
                self.output.line("");
                return Ok(());
            };

            match MenuChoice::parse(&line, entries.len()) {
                MenuChoice::Connect(target) => {
                    tracing::debug!("new target {target}");
                    if let Err(e) = self.connect_new(store, connector, &target).await {
                        self.output.error(&format!("starting session: {e}"));
                    }
                }
                MenuChoice::InvalidTarget(e) => {
                    self.output.warning(&format!("Invalid username@hostname.com input: {e}"));
                }
                MenuChoice::Select(index) => {
                    let credential = &entries[index].1;
                    if let Err(e) = self.connect_stored(store, connector, credential).await {
                        self.output.error(&format!("starting session: {e}"));
                    }
                }
                MenuChoice::Exit => {
                    self.output.line("Exiting...");
                    return Ok(());
                }
                MenuChoice::Unrecognized(input) => {
                    self.output.line(&format!("Unrecognized input: {input}"));
                }
                MenuChoice::Empty => {}
            }
        }
    }

    /// Connect to `target`, using the stored credential if there is one.
    pub async fn connect_target(
        &mut self,
        store: &CredentialStore,
        connector: &dyn Connector,
        target: &Target,
    ) -> Result<SessionReport> {
        match store.lookup(target)? {
            Some(credential) => self.connect_stored(store, connector, &credential).await,
            None => self.connect_new(store, connector, target).await,
        }
    }

    /// Ask for a password, store the new credential, then connect.
    ///
    /// The credential is stored before connecting; if that fails nothing is
    /// attempted, so a typed password is never silently lost.
    pub async fn connect_new(
        &mut self,
        store: &CredentialStore,
        connector: &dyn Connector,
        target: &Target,
    ) -> Result<SessionReport> {
        let password = self.passwords.read_password("Enter a password: ").await?;
        let credential = store.create(target, &password)?;
        self.connect_stored(store, connector, &credential).await
    }

    /// Connect with a stored credential and run the session prompt.
    pub async fn connect_stored(
        &mut self,
        store: &CredentialStore,
        connector: &dyn Connector,
        credential: &Credential,
    ) -> Result<SessionReport> {
        let target = credential.target()?;
        let password = store.reveal(credential)?;
        let request = ConnectRequest::new(target.clone(), password).port(self.port);

        self.output.line(&format!("Attempting to SSH into {target}..."));
        let sink = Arc::new(self.output.clone());
        let mut session = Session::new(self.session_config.clone(), sink)
            .with_span(tracing::info_span!("session", target = %target));
        session.connect(connector, request).await?;

        self.output.line(&format!("Connected to {}", target.hostname()));
        self.output.line("* Enter `hist` to see user cmd history");
        self.output.line("* Enter `exit` to end SSH session");
        self.run_session(&mut session).await
    }

    /// Prompt loop for an active session. Returns once the session is closed.
    pub async fn run_session(&mut self, session: &mut Session) -> Result<SessionReport> {
        let prompt = match session.target() {
            Some(target) => format!("{target} $ "),
            None => "$ ".to_string(),
        };

        let reason = loop {
            self.output.prompt(&prompt);

            let line = tokio::select! {
                line = self.input.next_line() => line,
                reason = session.wait_for_close() => {
                    self.output.line("");
                    break reason;
                }
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break CloseReason::InputEnded,
                Err(e) => {
                    tracing::error!("reading local input: {e}");
                    break CloseReason::InputEnded;
                }
            };

            match session.submit(line.trim_end_matches('\r')).await {
                Ok(Submission::Sent) => {
                    if !self.settle_delay.is_zero() {
                        tokio::time::sleep(self.settle_delay).await;
                    }
                }
                Ok(Submission::History(history)) => self.output.prompt(&history),
                Ok(Submission::Exit) => break CloseReason::UserExit,
                Err(SessionError::InputClosed) => {
                    self.output.warning("remote input is closed");
                }
                Err(e) => return Err(e.into()),
            }
        };

        let report = session.close(reason).await?;
        for warning in &report.warnings {
            self.output.warning(&warning.message);
        }
        match &report.target {
            Some(target) => self.output.line(&format!("Session with {target} ended: {}", report.reason)),
            None => self.output.line(&format!("Session ended: {}", report.reason)),
        }
        Ok(report)
    }
}
