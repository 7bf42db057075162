// ABOUTME: Persisted login credentials and the encoding of their passwords.
// ABOUTME: The session engine never touches this module directly.

mod codec;
mod error;
mod store;

pub use codec::{PasswordCodec, PasswordEncoding, SEALED_PREFIX};
pub use error::{CodecError, Result, StoreError};
pub use store::{Credential, CredentialStore, STORE_FILENAME};
