// ABOUTME: Session lifecycle states and the transitions allowed between them.
// ABOUTME: Failed and Closed are terminal; every other move is checked.

use std::fmt;

/// Lifecycle of a single interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, no connect request yet.
    Idle,
    /// Waiting on the connection opener.
    Connecting,
    /// Connection is open and authenticated; streams not yet wired.
    Authenticated,
    /// Relay tasks running, shell ready for input.
    Active,
    /// Teardown in progress.
    Closing,
    /// All relay tasks finished and resources released.
    Closed,
    /// Connect or stream setup failed. Absorbing.
    Failed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Authenticated)
                | (Connecting, Failed)
                | (Authenticated, Active)
                | (Authenticated, Failed)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why an active session moved to `Closing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The user typed `exit`.
    UserExit,
    /// The remote output stream reached end-of-stream.
    RemoteClosed,
    /// A reader hit an unrecoverable I/O error.
    RelayFailed(String),
    /// The local input source ended (e.g. stdin closed).
    InputEnded,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::UserExit => f.write_str("user exit"),
            CloseReason::RemoteClosed => f.write_str("remote closed the session"),
            CloseReason::RelayFailed(e) => write!(f, "stream error: {e}"),
            CloseReason::InputEnded => f.write_str("local input ended"),
        }
    }
}
