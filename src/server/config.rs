//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::TokenSetting;
use crate::error::{Error, Result};
use crate::history::MAX_HISTORY_SIZE;
use crate::registry::RegistryConfig;
use crate::storage::CleanupConfig;

/// Default cap on a request body (500 MiB)
pub const DEFAULT_MAX_REQUEST_BODY: u64 = 500 * 1024 * 1024;

/// Variable holding the payload directory
pub const STORAGE_DIR_VAR: &str = "CLIPFLOW_STORAGE_DIR";

/// Variable holding the payload retention window in minutes
pub const FILE_CACHE_MINUTES_VAR: &str = "CLIPFLOW_FILE_CACHE_MINUTES";

/// Variable holding the global request body cap in bytes
pub const MAX_REQUEST_BODY_VAR: &str = "CLIPFLOW_MAX_REQUEST_BODY";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Accepted tokens and their upload limits
    pub tokens: Vec<TokenSetting>,

    /// Directory holding uploaded payloads
    pub storage_dir: PathBuf,

    /// Largest request body accepted from any token
    pub max_request_body: u64,

    /// Records kept per user
    pub history_capacity: usize,

    /// Heartbeat settings for live connections
    pub registry: RegistryConfig,

    /// Payload sweep settings
    pub cleanup: CleanupConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            tokens: Vec::new(),
            storage_dir: PathBuf::from("files"),
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
            history_capacity: MAX_HISTORY_SIZE,
            registry: RegistryConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Accept an additional token
    pub fn token(mut self, setting: TokenSetting) -> Self {
        self.tokens.push(setting);
        self
    }

    /// Set the payload directory
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the global request body cap
    pub fn max_request_body(mut self, bytes: u64) -> Self {
        self.max_request_body = bytes;
        self
    }

    /// Set how long unreferenced payloads are kept
    pub fn file_cache_minutes(mut self, minutes: u64) -> Self {
        self.cleanup = self.cleanup.file_cache_minutes(minutes);
        self
    }

    /// Set the registry configuration
    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    /// Set the cleanup configuration
    pub fn cleanup(mut self, config: CleanupConfig) -> Self {
        self.cleanup = config;
        self
    }

    /// Override settings from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Override the storage directory, retention window and body cap from
    /// `lookup`. Unset or empty variables keep the current value.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var(STORAGE_DIR_VAR) {
            self = self.storage_dir(dir);
        }
        if let Some(raw) = var(FILE_CACHE_MINUTES_VAR) {
            self = self.file_cache_minutes(parse_u64(FILE_CACHE_MINUTES_VAR, &raw)?);
        }
        if let Some(raw) = var(MAX_REQUEST_BODY_VAR) {
            self = self.max_request_body(parse_u64(MAX_REQUEST_BODY_VAR, &raw)?);
        }

        Ok(self)
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a whole number, got '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.tokens.is_empty());
        assert_eq!(config.storage_dir, PathBuf::from("files"));
        assert_eq!(config.max_request_body, 524_288_000);
        assert_eq!(config.history_capacity, 3);
        assert_eq!(config.cleanup.retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_apply_vars() {
        let config = ServerConfig::default()
            .apply_vars(|name| match name {
                STORAGE_DIR_VAR => Some("/var/lib/clipflow".into()),
                FILE_CACHE_MINUTES_VAR => Some("15".into()),
                MAX_REQUEST_BODY_VAR => Some(" ".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/clipflow"));
        assert_eq!(config.cleanup.retention, Duration::from_secs(15 * 60));
        assert_eq!(config.max_request_body, DEFAULT_MAX_REQUEST_BODY);

        let untouched = ServerConfig::default().apply_vars(|_| None).unwrap();
        assert_eq!(untouched.storage_dir, PathBuf::from("files"));
        assert_eq!(untouched.cleanup.retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_apply_vars_rejects_bad_number() {
        let err = ServerConfig::default()
            .apply_vars(|name| (name == FILE_CACHE_MINUTES_VAR).then(|| "an hour".to_string()))
            .unwrap_err();

        assert!(matches!(err, Error::Config(ref msg) if msg.contains(FILE_CACHE_MINUTES_VAR)));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .token(TokenSetting::new("a"))
            .token(TokenSetting::new("b").max_file_size_mb(10.0))
            .storage_dir("/tmp/clips")
            .max_request_body(1024)
            .file_cache_minutes(5)
            .registry(RegistryConfig::default().heartbeat_timeout(Duration::from_secs(30)));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.tokens.len(), 2);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.max_request_body, 1024);
        assert_eq!(config.cleanup.retention, Duration::from_secs(300));
        assert_eq!(config.registry.heartbeat_timeout, Duration::from_secs(30));
    }
}
