//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        if let Some(s3) = config.storage.s3.as_mut() {
            s3.clear_unexpanded_credentials();
        }
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` and `${VAR:-default}`.
    ///
    /// A variable that is unset and has no default keeps its placeholder.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let mut result = String::with_capacity(content.len());
        let mut last_match = 0;

        for cap in re.captures_iter(content) {
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
        Ok(result)
    }
}
