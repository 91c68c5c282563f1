//! Configuration for the Tokenless backend.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL; the JWKS URI is discovered from it.
    pub issuer: String,
    /// Expected `aud` claim. Empty disables the audience check.
    #[serde(default)]
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, optionally prefixed with `sqlite:`.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// `*` or a comma-separated list of origins.
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

impl CorsConfig {
    /// Explicit origins, or `None` when any origin is allowed.
    pub fn origin_list(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            None
        } else {
            Some(origins)
        }
    }
}

/// Status transition policy for meal requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleConfig {
    /// Accept any status value, including moving a decided request back to pending.
    #[serde(default)]
    pub allow_reopen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Buffer size of the meal event broadcast channel.
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_database_url() -> String {
    "sqlite:./data/tokenless.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "*".to_string()
}
fn default_events_capacity() -> usize {
    256
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (TOKENLESS__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("TOKENLESS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Config, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = from_toml(
            r#"
            [oidc]
            issuer = "https://auth.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database.url, "sqlite:./data/tokenless.db");
        assert_eq!(config.logging.level, "info");
        assert!(config.oidc.audience.is_empty());
        assert!(!config.lifecycle.allow_reopen);
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn test_missing_issuer_is_an_error() {
        assert!(from_toml("port = 9000").is_err());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config = from_toml(
            r#"
            port = 9000
            [oidc]
            issuer = "https://auth.example.com"
            audience = "tokenless"
            [lifecycle]
            allow_reopen = true
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.oidc.audience, "tokenless");
        assert!(config.lifecycle.allow_reopen);
    }

    #[test]
    fn test_cors_origin_list() {
        let any = CorsConfig::default();
        assert!(any.origin_list().is_none());

        let listed = CorsConfig {
            origins: "https://a.example.com, https://b.example.com".to_string(),
        };
        assert_eq!(
            listed.origin_list().unwrap(),
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }
}
