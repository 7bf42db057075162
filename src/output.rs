// ABOUTME: Console rendering for menus, prompts, and remote shell output.
// ABOUTME: Supports human-readable and JSON-lines output modes.

use crate::session::{OutputSink, RemoteStream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;

/// Output mode for console feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Plain text, as a terminal user expects
    #[default]
    Normal,
    /// JSON lines for scripting
    Json,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Renders console output. Cheap to clone; clones share the writers, so
/// lines from relay tasks and the prompt loop never interleave mid-line.
#[derive(Clone)]
pub struct Output {
    mode: OutputMode,
    out: SharedWriter,
    err: SharedWriter,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").field("mode", &self.mode).finish()
    }
}

impl Output {
    /// Write to the process's stdout and stderr.
    pub fn new(mode: OutputMode) -> Self {
        Self::with_writers(mode, Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn with_writers(
        mode: OutputMode,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            mode,
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn emit(&self, writer: &SharedWriter, event: &str, message: &str, newline: bool) {
        let mut w = writer.lock();
        let result = match self.mode {
            OutputMode::Normal if newline => writeln!(w, "{message}"),
            OutputMode::Normal => write!(w, "{message}"),
            OutputMode::Json => {
                let event = JsonEvent { event, message };
                match serde_json::to_string(&event) {
                    Ok(json) => writeln!(w, "{json}"),
                    Err(e) => {
                        tracing::debug!("failed to encode output event: {e}");
                        return;
                    }
                }
            }
        };
        if let Err(e) = result.and_then(|_| w.flush()) {
            tracing::debug!("console write failed: {e}");
        }
    }

    /// Informational text (menus, banners, status).
    pub fn line(&self, message: &str) {
        self.emit(&self.out, "info", message, true);
    }

    /// A prompt; no trailing newline in normal mode.
    pub fn prompt(&self, prompt: &str) {
        self.emit(&self.out, "prompt", prompt, false);
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => self.emit(&self.err, "warning", &format!("Warning: {message}"), true),
            OutputMode::Json => self.emit(&self.err, "warning", message, true),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => self.emit(&self.err, "error", &format!("Error: {message}"), true),
            OutputMode::Json => self.emit(&self.err, "error", message, true),
        }
    }
}

impl OutputSink for Output {
    fn remote_line(&self, stream: RemoteStream, line: &str) {
        match stream {
            RemoteStream::Stdout => self.emit(&self.out, "stdout", line, true),
            RemoteStream::Stderr => self.emit(&self.err, "stderr", line, true),
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
}
