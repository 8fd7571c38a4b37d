//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::ServerConfig;
use super::validation::validate;
use std::path::Path;
use tracing::debug;

/// Loads and validates [`ServerConfig`] from TOML.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ServerConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "Loading server configuration");
        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<ServerConfig> {
        let config: ServerConfig = toml::from_str(content)?;
        Self::check(&config)?;
        Ok(config)
    }

    /// Load configuration or return the default if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ServerConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(ServerConfig::default())
        }
    }

    /// Validate a configuration built in code.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every invalid field.
    pub fn check(config: &ServerConfig) -> ConfigResult<()> {
        let errors = validate(config);
        if errors.is_empty() {
            return Ok(());
        }

        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(ConfigError::ValidationError(messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            host = "ws://localhost"
            upgrade_timeout = "3s"
        "#,
            )
            .unwrap();
        assert_eq!(config.host.as_deref(), Some("ws://localhost"));
        assert_eq!(config.upgrade_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("wsgate.toml");

        std::fs::write(
            &config_path,
            r#"
            buffer_size = 2048
            max_frame_count = 16
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.message_capacity(), 2048 * 16);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/wsgate.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new();
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_malformed_toml() {
        let loader = ConfigLoader::new();
        let result = loader.load_str("buffer_size = \"large\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_failure() {
        let loader = ConfigLoader::new();
        let result = loader.load_str("max_frame_count = 0");
        match result {
            Err(ConfigError::ValidationError(message)) => {
                assert!(message.contains("max_frame_count"));
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
