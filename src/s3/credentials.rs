//! S3 Credentials Module
//!
//! Static key pairs for the S3 adapter. Credentials are always passed in
//! explicitly through [`S3Config`]; [`CredentialsProvider::from_env`] exists
//! for callers that build an `S3Config` in code and want the conventional
//! `S3_KEY` / `S3_SECRET` variables.
//!
//! # Example
//!
//! ```
//! use wave_uploadr::config::S3Config;
//! use wave_uploadr::s3::CredentialsProvider;
//!
//! let config = S3Config {
//!     bucket: "avatars".into(),
//!     region: "us-east-1".into(),
//!     endpoint: None,
//!     access_key: Some("access-key".into()),
//!     secret_key: Some("secret-key".into()),
//!     create_bucket: false,
//! };
//!
//! let creds = CredentialsProvider::from_config(&config).unwrap().unwrap();
//! assert_eq!(creds.access_key_id(), "access-key");
//! ```

use crate::config::S3Config;
use thiserror::Error;

/// Environment variable holding the access key
pub const ACCESS_KEY_VAR: &str = "S3_KEY";

/// Environment variable holding the secret key
pub const SECRET_KEY_VAR: &str = "S3_SECRET";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Access key pair for the object store
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

impl From<Credentials> for aws_credential_types::Credentials {
    fn from(creds: Credentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            None,
            None,
            "wave-uploadr",
        )
    }
}

/// Factory methods for [`Credentials`]
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from `S3_KEY` and `S3_SECRET`
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = std::env::var(ACCESS_KEY_VAR).map_err(|_| {
            CredentialsError::MissingCredentials(format!("{} not set", ACCESS_KEY_VAR))
        })?;
        let secret_key = std::env::var(SECRET_KEY_VAR).map_err(|_| {
            CredentialsError::MissingCredentials(format!("{} not set", SECRET_KEY_VAR))
        })?;

        Ok(Credentials::new(access_key, secret_key))
    }

    /// Read credentials from `S3Config`.
    ///
    /// `Ok(None)` when neither key is configured, in which case the SDK's
    /// default provider chain applies. Setting only one key is an error.
    pub fn from_config(config: &S3Config) -> Result<Option<Credentials>, CredentialsError> {
        match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => Ok(Some(Credentials::new(access, secret))),
            (None, None) => Ok(None),
            (None, Some(_)) => Err(CredentialsError::MissingCredentials(
                "access_key not set in config".into(),
            )),
            (Some(_), None) => Err(CredentialsError::MissingCredentials(
                "secret_key not set in config".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config(access: Option<&str>, secret: Option<&str>) -> S3Config {
        S3Config {
            bucket: "test".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: access.map(String::from),
            secret_key: secret.map(String::from),
            create_bucket: false,
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("access", "super-secret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("access"));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn test_from_config_missing_access_key() {
        let result = CredentialsProvider::from_config(&config(None, Some("secret")));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_missing_secret_key() {
        let result = CredentialsProvider::from_config(&config(Some("access"), None));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_none() {
        let result = CredentialsProvider::from_config(&config(None, None)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_from_config_success() {
        let creds = CredentialsProvider::from_config(&config(Some("config-access"), Some("config-secret")))
            .unwrap()
            .unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(ACCESS_KEY_VAR, "env-access");
        std::env::set_var(SECRET_KEY_VAR, "env-secret");
        let creds = CredentialsProvider::from_env().unwrap();
        assert_eq!(creds.access_key_id(), "env-access");
        assert_eq!(creds.secret_access_key(), "env-secret");

        std::env::remove_var(SECRET_KEY_VAR);
        assert!(CredentialsProvider::from_env().is_err());
        std::env::remove_var(ACCESS_KEY_VAR);
    }
}
