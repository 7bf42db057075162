// ABOUTME: SSH implementation of the session engine's connection opener.
// ABOUTME: Password authentication with a configurable host key policy.

mod client;
mod error;
mod shell;

pub use client::{HostKeyPolicy, SshConnection, SshConnector};
pub use error::{Error, Result};
