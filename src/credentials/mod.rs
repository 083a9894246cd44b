//! Session-scoped API key storage
//!
//! The store holds at most one key. When no key is present, [`CredentialStore::ensure`]
//! asks a [`CredentialPrompt`] collaborator for one instead of making one up.

use std::env;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    InvalidCredential,

    #[error("No API key available: the credential prompt was abandoned")]
    CredentialUnavailable,
}

/// External surface that can acquire a key from the user or the environment.
///
/// Returning `None` means the prompt was abandoned.
pub trait CredentialPrompt: Send + Sync {
    fn request_key(&self) -> Option<String>;
}

/// Reads the key from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvPrompt {
    var: String,
}

impl EnvPrompt {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialPrompt for EnvPrompt {
    fn request_key(&self) -> Option<String> {
        let key = env::var(&self.var).ok()?;
        tracing::debug!("API key acquired from ${}", self.var);
        Some(key)
    }
}

/// Always abandons. Used when the key can only arrive through an explicit `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn request_key(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
pub struct CredentialStore {
    key: Option<String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Store a key, replacing any previous one.
    pub fn set(&mut self, key: &str) -> Result<(), CredentialError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CredentialError::InvalidCredential);
        }
        self.key = Some(key.to_string());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.key = None;
    }

    /// Return the current key, acquiring one through `prompt` if none is stored.
    pub fn ensure(&mut self, prompt: &dyn CredentialPrompt) -> Result<String, CredentialError> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }

        let acquired = prompt
            .request_key()
            .ok_or(CredentialError::CredentialUnavailable)?;
        self.set(&acquired)?;

        tracing::info!("API key acquired through prompt");
        Ok(acquired.trim().to_string())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.key.is_some())
            .finish()
    }
}
