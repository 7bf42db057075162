// ABOUTME: JSON-file credential store keyed by `username@hostname`.
// ABOUTME: Every mutation re-reads the whole file and overwrites it.

use super::codec::PasswordCodec;
use super::error::{Result, StoreError};
use crate::types::Target;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default store file name, relative to the home directory.
pub const STORE_FILENAME: &str = ".beach-shells.json";

/// A stored login. The password is always in encoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub hostname: String,
}

impl Credential {
    pub fn new(target: &Target, encoded_password: impl Into<String>) -> Self {
        Self {
            username: target.username().to_string(),
            password: encoded_password.into(),
            hostname: target.hostname().to_string(),
        }
    }

    pub fn target(&self) -> Result<Target> {
        Ok(Target::new(&self.username, &self.hostname)?)
    }
}

/// On-disk layout: `{"shells": {"user@host": {...}}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ShellCollection {
    #[serde(default)]
    shells: BTreeMap<String, Credential>,
}

/// File-backed credential store.
///
/// There is no locking: a single process is assumed to own the file.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    codec: PasswordCodec,
    span: tracing::Span,
}

impl CredentialStore {
    /// Open the store at `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>, codec: PasswordCodec) -> Result<Self> {
        let path = path.into();
        let store = Self {
            path,
            codec,
            span: tracing::info_span!("credentials"),
        };
        store.ensure_file()?;
        Ok(store)
    }

    /// Log under `span` instead of a fresh `credentials` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn ensure_file(&self) -> Result<()> {
        if self.path.exists() {
            tracing::debug!(parent: &self.span, "found {}", self.path.display());
            return Ok(());
        }
        tracing::warn!(parent: &self.span, "creating {} since it does not exist", self.path.display());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        std::fs::write(&self.path, b"").map_err(|e| self.io_error(e))?;
        tracing::info!(parent: &self.span, "initialized credential store");
        Ok(())
    }

    fn read(&self) -> Result<ShellCollection> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            return Ok(ShellCollection::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, collection: &ShellCollection) -> Result<()> {
        let json = serde_json::to_string_pretty(collection).map_err(StoreError::Serialize)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    /// The latest stored credential for `target`.
    pub fn lookup(&self, target: &Target) -> Result<Option<Credential>> {
        Ok(self.read()?.shells.remove(&target.key()))
    }

    /// All stored credentials. Callers must not rely on the order.
    pub fn list(&self) -> Result<Vec<(Target, Credential)>> {
        let collection = self.read()?;
        let mut entries = Vec::with_capacity(collection.shells.len());
        for (key, credential) in collection.shells {
            match credential.target() {
                Ok(target) => entries.push((target, credential)),
                Err(e) => tracing::warn!(parent: &self.span, "skipping stored entry {key}: {e}"),
            }
        }
        Ok(entries)
    }

    /// Insert or overwrite the credential under its `username@hostname` key.
    pub fn upsert(&self, credential: Credential) -> Result<()> {
        let key = credential.target()?.key();
        let mut collection = self.read()?;
        collection.shells.insert(key.clone(), credential);
        self.write(&collection)?;
        tracing::debug!(parent: &self.span, "stored credential for {key}");
        Ok(())
    }

    /// Encode `password` and store it for `target`.
    pub fn create(&self, target: &Target, password: &SecretString) -> Result<Credential> {
        let credential = Credential::new(target, self.seal(password)?);
        self.upsert(credential.clone())?;
        Ok(credential)
    }

    /// Encode a password with this store's codec.
    pub fn seal(&self, password: &SecretString) -> Result<String> {
        Ok(self.codec.encode(password)?)
    }

    /// Decode a stored credential's password.
    pub fn reveal(&self, credential: &Credential) -> Result<SecretString> {
        Ok(self.codec.decode(&credential.password)?)
    }
}
