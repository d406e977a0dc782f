//! Configuration management
//!
//! This module handles loading and parsing configuration for the
//! DevWrite auth service. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The two
//! signing secrets have insecure development defaults and must be
//! overridden in production deployments.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Auth (token + cookie) configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (for cookie-based auth)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "https://devwrite.app".to_string(),
    ]
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/devwrite-auth.db".to_string()
}

/// Database driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default, for single-binary deployment)
    Sqlite,
    /// MySQL (for larger deployments)
    Mysql,
}

impl Default for DatabaseDriver {
    fn default() -> Self {
        Self::Sqlite
    }
}

/// Auth configuration: signing secrets, token TTLs, cookie flags.
///
/// The two secrets are independent keys. Compromise of one must not
/// compromise the other, so they are configured (and rotated)
/// separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign access tokens
    #[serde(default = "default_access_secret")]
    pub access_secret: String,
    /// Secret used to sign refresh tokens
    #[serde(default = "default_refresh_secret")]
    pub refresh_secret: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,
    /// Refresh token (and session row) lifetime in days
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: i64,
    /// Whether auth cookies carry the Secure flag
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: default_access_secret(),
            refresh_secret: default_refresh_secret(),
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_days: default_refresh_ttl_days(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

fn default_access_secret() -> String {
    "dev-access-secret-change-me".to_string()
}

fn default_refresh_secret() -> String {
    "dev-refresh-secret-change-me".to_string()
}

fn default_access_ttl_minutes() -> i64 {
    15
}

fn default_refresh_ttl_days() -> i64 {
    30
}

fn default_secure_cookies() -> bool {
    false
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file
    #[error("Failed to parse config file {path} {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file.
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Environment variables follow the pattern:
    /// - DEVWRITE_SERVER_HOST
    /// - DEVWRITE_SERVER_PORT
    /// - DEVWRITE_DATABASE_DRIVER
    /// - DEVWRITE_DATABASE_URL
    /// - DEVWRITE_AUTH_ACCESS_SECRET
    /// - DEVWRITE_AUTH_REFRESH_SECRET
    /// - DEVWRITE_AUTH_ACCESS_TTL_MINUTES
    /// - DEVWRITE_AUTH_REFRESH_TTL_DAYS
    /// - DEVWRITE_AUTH_SECURE_COOKIES
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("DEVWRITE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DEVWRITE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(origins) = std::env::var("DEVWRITE_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Database configuration
        if let Ok(driver) = std::env::var("DEVWRITE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("DEVWRITE_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("DEVWRITE_AUTH_ACCESS_SECRET") {
            self.auth.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("DEVWRITE_AUTH_REFRESH_SECRET") {
            self.auth.refresh_secret = secret;
        }
        if let Ok(ttl) = std::env::var("DEVWRITE_AUTH_ACCESS_TTL_MINUTES") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.access_ttl_minutes = ttl;
            }
        }
        if let Ok(ttl) = std::env::var("DEVWRITE_AUTH_REFRESH_TTL_DAYS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.refresh_ttl_days = ttl;
            }
        }
        if let Ok(secure) = std::env::var("DEVWRITE_AUTH_SECURE_COOKIES") {
            match secure.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.auth.secure_cookies = true,
                "0" | "false" | "no" | "off" => self.auth.secure_cookies = false,
                _ => {} // Ignore invalid values
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for key in [
            "DEVWRITE_SERVER_HOST",
            "DEVWRITE_SERVER_PORT",
            "DEVWRITE_SERVER_CORS_ORIGINS",
            "DEVWRITE_DATABASE_DRIVER",
            "DEVWRITE_DATABASE_URL",
            "DEVWRITE_AUTH_ACCESS_SECRET",
            "DEVWRITE_AUTH_REFRESH_SECRET",
            "DEVWRITE_AUTH_ACCESS_TTL_MINUTES",
            "DEVWRITE_AUTH_REFRESH_TTL_DAYS",
            "DEVWRITE_AUTH_SECURE_COOKIES",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let _guard = lock_env();
        let config = Config::load(std::path::Path::new("/nonexistent/config.yml"))
            .expect("Missing file should return defaults");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.auth.access_ttl_minutes, 15);
        assert_eq!(config.auth.refresh_ttl_days, 30);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let _guard = lock_env();
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "   \n").expect("Failed to write temp file");

        let config = Config::load(file.path()).expect("Empty file should return defaults");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let _guard = lock_env();
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(
            file,
            "server:\n  port: 9000\nauth:\n  access_ttl_minutes: 5\n"
        )
        .expect("Failed to write temp file");

        let config = Config::load(file.path()).expect("Partial file should parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.access_ttl_minutes, 5);
        // Unspecified fields fall back to defaults
        assert_eq!(config.auth.refresh_ttl_days, 30);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let _guard = lock_env();
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "server: [unclosed").expect("Failed to write temp file");

        let result = Config::load(file.path());
        assert!(result.is_err(), "Invalid YAML should return an error");
    }

    #[test]
    fn test_env_overrides() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("DEVWRITE_SERVER_PORT", "3030");
        std::env::set_var("DEVWRITE_DATABASE_DRIVER", "mysql");
        std::env::set_var("DEVWRITE_AUTH_ACCESS_SECRET", "prod-access");
        std::env::set_var("DEVWRITE_AUTH_SECURE_COOKIES", "true");

        let config = Config::load_with_env(std::path::Path::new("/nonexistent/config.yml"))
            .expect("Should load with env overrides");

        assert_eq!(config.server.port, 3030);
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.auth.access_secret, "prod-access");
        assert!(config.auth.secure_cookies);

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("DEVWRITE_SERVER_PORT", "not-a-port");
        std::env::set_var("DEVWRITE_DATABASE_DRIVER", "oracle");

        let config = Config::load_with_env(std::path::Path::new("/nonexistent/config.yml"))
            .expect("Should load with env overrides");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);

        clear_env();
    }

    #[test]
    fn test_cors_origins_env_parsing() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var(
            "DEVWRITE_SERVER_CORS_ORIGINS",
            "http://localhost:5173, https://devwrite.app",
        );

        let config = Config::load_with_env(std::path::Path::new("/nonexistent/config.yml"))
            .expect("Should load with env overrides");

        assert_eq!(
            config.server.cors_origins,
            vec!["http://localhost:5173", "https://devwrite.app"]
        );

        clear_env();
    }
}
