// ABOUTME: Encoding of stored passwords.
// ABOUTME: New records are sealed with AES-256-GCM; bare base64 records are still readable.

use super::error::CodecError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Prefix marking a sealed password.
pub const SEALED_PREFIX: &str = "aead:";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Which encoding new passwords are written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PasswordEncoding {
    /// AES-256-GCM with a local key file.
    #[default]
    Sealed,
    /// Bare base64. Anyone who can read the store can read the password.
    Legacy,
}

/// Encodes and decodes stored passwords.
///
/// Decoding looks at the record itself: values starting with
/// [`SEALED_PREFIX`] are decrypted, anything else is treated as bare base64.
/// Bare base64 is reversible by anyone and is only kept so existing stores
/// stay readable.
#[derive(Clone)]
pub struct PasswordCodec {
    encoding: PasswordEncoding,
    key: Option<Key<Aes256Gcm>>,
}

impl fmt::Debug for PasswordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCodec")
            .field("encoding", &self.encoding)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PasswordCodec {
    /// Bare base64, no key.
    pub fn legacy() -> Self {
        Self {
            encoding: PasswordEncoding::Legacy,
            key: None,
        }
    }

    /// Seal with the given 256-bit key.
    pub fn sealed(key: [u8; KEY_LEN]) -> Self {
        Self {
            encoding: PasswordEncoding::Sealed,
            key: Some(Key::<Aes256Gcm>::from(key)),
        }
    }

    /// Read the key at `path`, generating and saving one if the file does not exist.
    pub fn load_or_create_key(path: &Path) -> Result<Self, CodecError> {
        let key = match std::fs::read(path) {
            Ok(bytes) => {
                if bytes.len() != KEY_LEN {
                    return Err(CodecError::InvalidKey {
                        path: path.to_path_buf(),
                        reason: format!("expected {KEY_LEN} bytes, found {}", bytes.len()),
                    });
                }
                Key::<Aes256Gcm>::clone_from_slice(&bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = Aes256Gcm::generate_key(OsRng);
                write_key(path, key.as_slice()).map_err(|source| CodecError::KeyIo {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::info!("generated password key at {}", path.display());
                key
            }
            Err(source) => {
                return Err(CodecError::KeyIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(Self {
            encoding: PasswordEncoding::Sealed,
            key: Some(key),
        })
    }

    /// Build the codec for `encoding`, loading the key only when sealing.
    pub fn for_encoding(encoding: PasswordEncoding, key_path: &Path) -> Result<Self, CodecError> {
        match encoding {
            PasswordEncoding::Sealed => Self::load_or_create_key(key_path),
            PasswordEncoding::Legacy => {
                tracing::warn!("storing passwords as bare base64; this is not encryption");
                // A key that already exists still lets sealed records be read.
                let key = std::fs::read(key_path)
                    .ok()
                    .filter(|bytes| bytes.len() == KEY_LEN)
                    .map(|bytes| Key::<Aes256Gcm>::clone_from_slice(&bytes));
                Ok(Self {
                    encoding: PasswordEncoding::Legacy,
                    key,
                })
            }
        }
    }

    pub fn encoding(&self) -> PasswordEncoding {
        self.encoding
    }

    pub fn encode(&self, password: &SecretString) -> Result<String, CodecError> {
        let plain = password.expose_secret().as_bytes();
        match (self.encoding, &self.key) {
            (PasswordEncoding::Legacy, _) => Ok(STANDARD.encode(plain)),
            (PasswordEncoding::Sealed, None) => Err(CodecError::MissingKey),
            (PasswordEncoding::Sealed, Some(key)) => {
                let cipher = Aes256Gcm::new(key);
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, plain)
                    .map_err(|_| CodecError::Encrypt)?;

                let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                sealed.extend_from_slice(&nonce);
                sealed.extend_from_slice(&ciphertext);
                Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(sealed)))
            }
        }
    }

    pub fn decode(&self, encoded: &str) -> Result<SecretString, CodecError> {
        match encoded.strip_prefix(SEALED_PREFIX) {
            Some(sealed) => self.open_sealed(sealed),
            None => {
                tracing::debug!("decoding a bare base64 password");
                let bytes = STANDARD.decode(encoded.trim())?;
                let password = String::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?;
                Ok(SecretString::from(password.trim().to_string()))
            }
        }
    }

    fn open_sealed(&self, sealed: &str) -> Result<SecretString, CodecError> {
        let key = self.key.as_ref().ok_or(CodecError::MissingKey)?;
        let bytes = STANDARD.decode(sealed.trim())?;
        if bytes.len() <= NONCE_LEN {
            return Err(CodecError::Decrypt);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plain = Aes256Gcm::new(key)
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decrypt)?;
        let password = String::from_utf8(plain).map_err(|_| CodecError::NotUtf8)?;
        Ok(SecretString::from(password))
    }
}

fn write_key(path: &Path, key: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    // Owner-only from the moment the file exists.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key)?;
    file.sync_all()
}
