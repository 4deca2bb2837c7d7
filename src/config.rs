//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Default maximum request body size (100 MiB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum number of files accepted by `/upload-multiple`
pub const DEFAULT_MAX_FILES: usize = 10;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory uploaded files are written to, as configured
    pub upload_dir: String,
    /// Maximum request body size in bytes
    pub max_upload_size: usize,
    /// Maximum number of files in a single multi-file upload
    pub max_files: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            server: ServerConfig {
                port: lookup("PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3000),
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            },
            storage: StorageConfig {
                upload_dir: lookup("UPLOAD_DIR")
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| "./uploads".to_string()),
                max_upload_size: lookup("MAX_UPLOAD_SIZE")
                    .and_then(|s| s.parse().ok())
                    .filter(|s| *s > 0)
                    .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE),
                max_files: lookup("MAX_FILES")
                    .and_then(|n| n.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_MAX_FILES),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl StorageConfig {
    /// Storage configuration rooted at `upload_dir` with default limits
    pub fn with_dir(upload_dir: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.upload_dir, "./uploads");
        assert_eq!(config.storage.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(config.storage.max_files, 10);
        assert_eq!(config.server_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("HOST", "127.0.0.1"),
            ("UPLOAD_DIR", "/srv/files"),
            ("MAX_UPLOAD_SIZE", "2048"),
            ("MAX_FILES", "3"),
        ]));
        assert_eq!(config.server_addr(), "127.0.0.1:8081");
        assert_eq!(config.storage.upload_dir, "/srv/files");
        assert_eq!(config.storage.max_upload_size, 2048);
        assert_eq!(config.storage.max_files, 3);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("UPLOAD_DIR", "  "),
            ("MAX_UPLOAD_SIZE", "0"),
            ("MAX_FILES", "-1"),
        ]));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.upload_dir, "./uploads");
        assert_eq!(config.storage.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(config.storage.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        env::set_var("UPLOAD_DIR", "/tmp/env-upload-dir");
        env::set_var("PORT", "4321");
        let config = Config::from_env();
        env::remove_var("UPLOAD_DIR");
        env::remove_var("PORT");

        assert_eq!(config.storage.upload_dir, "/tmp/env-upload-dir");
        assert_eq!(config.server.port, 4321);
    }
}
