//! Credential storage

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Access/refresh token pair, always stored and cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Durable key/value storage for the tokens and the cached user profile.
///
/// Implementations never fail: unreadable data is logged and reported as
/// absent, and write failures are logged and swallowed.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Replace both tokens.
    fn set(&self, credential: &Credential);
    /// Remove tokens and user.
    fn clear(&self);
    fn user_value(&self) -> Option<serde_json::Value>;
    fn set_user_value(&self, user: &serde_json::Value);

    /// Both tokens, if both are present.
    fn get(&self) -> Option<Credential> {
        Some(Credential {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
        })
    }
}

impl dyn CredentialStore {
    /// Cached user profile decoded as `T`. A value that doesn't match `T` is
    /// treated as absent.
    pub fn get_user<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.user_value()?;
        match serde_json::from_value(value) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Ignoring malformed cached user: {}", e);
                None
            }
        }
    }

    pub fn set_user<T: Serialize>(&self, user: &T) {
        match serde_json::to_value(user) {
            Ok(value) => self.set_user_value(&value),
            Err(e) => tracing::error!("Failed to serialize user for storage: {}", e),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Slots {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<serde_json::Value>,
}

/// In-process credential store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<Slots>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Slots) -> R) -> R {
        let mut guard = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl CredentialStore for MemoryStore {
    fn access_token(&self) -> Option<String> {
        self.with(|s| s.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.with(|s| s.refresh_token.clone())
    }

    fn set(&self, credential: &Credential) {
        self.with(|s| {
            s.access_token = Some(credential.access_token.clone());
            s.refresh_token = Some(credential.refresh_token.clone());
        })
    }

    fn clear(&self) {
        self.with(|s| *s = Slots::default())
    }

    fn user_value(&self) -> Option<serde_json::Value> {
        self.with(|s| s.user.clone())
    }

    fn set_user_value(&self, user: &serde_json::Value) {
        self.with(|s| s.user = Some(user.clone()))
    }
}
