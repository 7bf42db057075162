// ABOUTME: Reading a password without echoing it.

use async_trait::async_trait;
use secrecy::SecretString;

/// Where new passwords come from.
#[async_trait]
pub trait PasswordSource: Send + Sync {
    async fn read_password(&self, prompt: &str) -> std::io::Result<SecretString>;
}

/// Reads from the controlling terminal with echo disabled.
#[derive(Debug, Default)]
pub struct TerminalPassword;

#[async_trait]
impl PasswordSource for TerminalPassword {
    async fn read_password(&self, prompt: &str) -> std::io::Result<SecretString> {
        let prompt = prompt.to_string();
        let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(std::io::Error::other)??;
        Ok(SecretString::from(password))
    }
}
