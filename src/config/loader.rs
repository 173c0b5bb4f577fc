//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // Captures ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("env var pattern is valid");
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables.
    ///
    /// Supports two syntaxes:
    /// - `${VAR_NAME}` keeps the placeholder if the variable is unset
    /// - `${VAR_NAME:-default}` falls back to `default`
    fn expand_env_vars(content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut last_match = 0;

        for cap in ENV_VAR.captures_iter(content) {
            let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            result.push_str(&content[last_match..full_match.start()]);

            match std::env::var(var_name.as_str()) {
                Ok(value) => result.push_str(&value),
                Err(_) => match cap.get(2) {
                    Some(default) => result.push_str(default.as_str()),
                    None => result.push_str(full_match.as_str()),
                },
            }

            last_match = full_match.end();
        }

        result.push_str(&content[last_match..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("NAGARI_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${NAGARI_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("NAGARI_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default() {
        std::env::remove_var("NAGARI_MISSING_VAR");
        let expanded = ConfigLoader::expand_env_vars("url: ${NAGARI_MISSING_VAR:-http://localhost}");
        assert_eq!(expanded, "url: http://localhost");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_keeps_unset_placeholder() {
        std::env::remove_var("NAGARI_MISSING_VAR");
        let expanded = ConfigLoader::expand_env_vars("token: ${NAGARI_MISSING_VAR}");
        assert_eq!(expanded, "token: ${NAGARI_MISSING_VAR}");
    }

    #[test]
    fn test_load_minimal_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client:\n  endpoint: http://localhost:8000/api/upload").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.client.endpoint, "http://localhost:8000/api/upload");
        assert!(config.client.public);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.policy.timeout_seconds, 120);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let result = ConfigLoader::load_str(
            "client:\n  endpoint: http://localhost\nretry:\n  max_attempts: 0\n",
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load("/nonexistent/nagari-upload.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
