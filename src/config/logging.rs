// ABOUTME: Logging configuration handed to the binary's tracing setup.
// ABOUTME: The library only emits events; it never installs a subscriber.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit debug events with source locations.
    pub debug: bool,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        if self.debug { "debug" } else { "warn" }
    }
}
