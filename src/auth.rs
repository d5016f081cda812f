//! Token authentication
//!
//! Callers present a shared token plus a user key. The token must be one of
//! the configured tokens; the user key selects whose history and devices the
//! request touches.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::UserKey;

/// One accepted token and its upload limit
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSetting {
    /// The token value
    pub token: String,

    /// Maximum upload size in MiB (0 or less = unlimited)
    pub max_file_size_mb: f64,
}

impl TokenSetting {
    /// Token without an upload limit
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            max_file_size_mb: 0.0,
        }
    }

    /// Set the upload limit in MiB
    pub fn max_file_size_mb(mut self, mb: f64) -> Self {
        self.max_file_size_mb = mb;
        self
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        if self.max_file_size_mb > 0.0 {
            Some((self.max_file_size_mb * 1024.0 * 1024.0) as u64)
        } else {
            None
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Whose history and devices this request acts on
    pub user_key: UserKey,

    /// Upload limit in bytes for this caller's token
    pub max_upload_bytes: Option<u64>,
}

/// Validates tokens against a fixed table
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, TokenSetting>,
}

impl TokenAuthenticator {
    /// Create an authenticator from token settings
    pub fn new(settings: impl IntoIterator<Item = TokenSetting>) -> Self {
        let tokens = settings
            .into_iter()
            .filter(|s| !s.token.is_empty())
            .map(|s| (s.token.clone(), s))
            .collect();
        Self { tokens }
    }

    /// Number of accepted tokens
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Authenticate a request
    pub fn authenticate(&self, token: Option<&str>, user_key: Option<&str>) -> Result<Principal> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(Error::Unauthenticated("missing token"))?;

        let setting = self
            .tokens
            .get(token)
            .ok_or(Error::Unauthenticated("unknown token"))?;

        let user_key = user_key
            .filter(|k| !k.is_empty())
            .ok_or(Error::Unauthenticated("missing user key"))?;

        Ok(Principal {
            user_key: UserKey::new(user_key),
            max_upload_bytes: setting.max_upload_bytes(),
        })
    }
}
