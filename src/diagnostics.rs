// ABOUTME: Diagnostics accumulator for non-fatal warnings during session teardown.
// ABOUTME: Close failures are collected and reported, never raised.

/// Collects non-fatal warnings while a session shuts down.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during teardown.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create a shell channel close warning.
    pub fn shell_close(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ShellClose,
            message: message.into(),
        }
    }

    /// Create a connection close warning.
    pub fn connection_close(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ConnectionClose,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to close the remote shell channel.
    ShellClose,
    /// Failed to close the underlying connection.
    ConnectionClose,
}
