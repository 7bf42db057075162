// ABOUTME: Remote login target in `username@hostname` form.
// ABOUTME: Doubles as the key under which a credential is stored.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target must be in the form username@hostname")]
    MissingSeparator,

    #[error("username cannot be empty")]
    EmptyUsername,

    #[error("hostname cannot be empty")]
    EmptyHostname,

    #[error("invalid character in target: '{0}'")]
    InvalidChar(char),
}

/// A `(username, hostname)` pair identifying one remote account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    username: String,
    hostname: String,
}

impl Target {
    pub fn new(username: &str, hostname: &str) -> Result<Self, TargetError> {
        if username.is_empty() {
            return Err(TargetError::EmptyUsername);
        }
        if hostname.is_empty() {
            return Err(TargetError::EmptyHostname);
        }

        for c in username.chars().chain(hostname.chars()) {
            if c == '@' || c.is_whitespace() || c.is_control() {
                return Err(TargetError::InvalidChar(c));
            }
        }

        Ok(Self {
            username: username.to_string(),
            hostname: hostname.to_string(),
        })
    }

    /// Parse `username@hostname`.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let (username, hostname) = s
            .trim()
            .split_once('@')
            .ok_or(TargetError::MissingSeparator)?;
        Self::new(username, hostname)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Store key, identical to the display form.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.hostname)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
