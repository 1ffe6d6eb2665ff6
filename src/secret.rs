use std::fmt;
use std::sync::atomic::{Ordering, compiler_fence};

use thiserror::Error;

use crate::task::{Account, Credential};

/// A string whose backing memory is overwritten with zeros when dropped.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        // Zero bytes are valid UTF-8, so the String stays well formed.
        let bytes = unsafe { self.0.as_mut_vec() };
        for byte in bytes.iter_mut() {
            unsafe { std::ptr::write_volatile(byte, 0) };
        }
        compiler_fence(Ordering::SeqCst);
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No password stored for account {0}")]
    Missing(String),

    #[error("Environment variable {var} for account {account} is not set")]
    MissingEnv { account: String, var: String },
}

/// Turns a stored credential into a usable secret right before launch.
pub trait CredentialDecryptor: Send + Sync {
    fn decrypt(&self, account: &Account) -> Result<Secret, CredentialError>;
}

/// Resolves credentials kept inline in the config file or in environment variables.
pub struct ConfigCredentials;

impl CredentialDecryptor for ConfigCredentials {
    fn decrypt(&self, account: &Account) -> Result<Secret, CredentialError> {
        match &account.credential {
            Credential::Stored(secret) if secret.is_empty() => {
                Err(CredentialError::Missing(account.username.clone()))
            }
            Credential::Stored(secret) => Ok(secret.clone()),
            Credential::Env(var) => std::env::var(var).map(Secret::from).map_err(|_| {
                CredentialError::MissingEnv {
                    account: account.username.clone(),
                    var: var.clone(),
                }
            }),
        }
    }
}
