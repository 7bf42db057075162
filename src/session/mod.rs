// ABOUTME: Interactive remote session engine.
// ABOUTME: State machine, relay tasks, command history, and the opener seams.

mod engine;
mod error;
mod history;
mod opener;
mod relay;
mod state;

pub use engine::{
    EXIT_COMMAND, HISTORY_COMMAND, Session, SessionConfig, SessionReport, Submission,
};
pub use error::{ConnectError, PipeSetupError, RelayError, Result, SessionError};
pub use history::{CommandHistory, HISTORY_CAPACITY};
pub use opener::{
    ConnectRequest, Connector, DEFAULT_PORT, OutputSink, RemoteConnection, RemoteReader,
    RemoteShell, RemoteStream, RemoteWriter, ShellPipes,
};
pub use relay::{
    INPUT_QUEUE_CAPACITY, LineReader, MAX_LINE_LEN, RelayExit, RelayKind, RelayOutcome, input_queue,
};
pub use state::{CloseReason, SessionState};
