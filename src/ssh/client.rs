// ABOUTME: SSH connection opener using russh with password authentication.
// ABOUTME: Server identity checking is an explicit policy, not a hardcoded default.

use super::error::{Error, Result};
use super::shell::SshShell;
use crate::session::{ConnectError, ConnectRequest, Connector, PipeSetupError, RemoteConnection, RemoteShell};
use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use russh::Disconnect;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How the server's host key is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Only hosts already in known_hosts are accepted.
    Verify,
    /// Unknown hosts are accepted and learned; changed keys are rejected.
    #[default]
    TrustFirstUse,
    /// Any key is accepted. Opt-out of identity checking.
    AcceptAny,
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if self.policy == HostKeyPolicy::AcceptAny {
            return Ok(true);
        }

        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) if self.policy == HostKeyPolicy::TrustFirstUse => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                let learn_result = match &self.known_hosts_path {
                    Some(path) => {
                        learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                    }
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learn_result {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(
                    "host key for {}:{} does not match known_hosts",
                    self.host,
                    self.port
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("could not read known_hosts: {e}");
                Ok(self.policy == HostKeyPolicy::TrustFirstUse)
            }
        }
    }
}

/// Opens password-authenticated SSH connections.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    host_key_policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl SshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<SshConnection> {
        let host = request.target.hostname();
        if self.host_key_policy == HostKeyPolicy::AcceptAny {
            tracing::warn!("host key checking is disabled for {host}");
        }

        // No inactivity timeout: an idle interactive shell stays open.
        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler {
            host: host.to_string(),
            port: request.port,
            policy: self.host_key_policy,
            known_hosts_path: self.known_hosts_path.clone(),
        };

        let mut handle = client::connect(Arc::new(russh_config), (host, request.port), handler)
            .await
            .map_err(|e| match e {
                russh::Error::UnknownKey => Error::HostKeyRejected(host.to_string()),
                russh::Error::IO(io) => {
                    Error::Connection(format!("{}:{}: {}", host, request.port, io))
                }
                other => Error::Protocol(other),
            })?;

        let auth = handle
            .authenticate_password(request.target.username(), request.password.expose_secret())
            .await?;
        if !auth.success() {
            return Err(Error::AuthenticationFailed(request.target.to_string()));
        }

        Ok(SshConnection {
            handle,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(
        &self,
        request: &ConnectRequest,
    ) -> std::result::Result<Arc<dyn RemoteConnection>, ConnectError> {
        let connection = self.connect(request).await?;
        Ok(Arc::new(connection))
    }
}

/// An authenticated SSH connection.
pub struct SshConnection {
    handle: Handle<SshHandler>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnection")
            .field("handle", &"<russh::Handle>")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn new_session(&self) -> std::result::Result<Box<dyn RemoteShell>, PipeSetupError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;
        Ok(Box::new(SshShell::new(channel)))
    }

    async fn close(&self) -> std::io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(std::io::Error::other)
    }
}
