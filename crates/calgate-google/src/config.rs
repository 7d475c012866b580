//! Credential resolver configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ServiceError, ServiceResult};

/// Which kind of credential the resolver produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Interactive user credential: cached token record, refresh grant,
    /// consent flow as a last resort.
    #[default]
    InteractiveUser,
    /// Service-account credential minted fresh from a private key file on
    /// every resolution.
    ServiceAccount,
}

/// Configuration for credential resolution.
///
/// The token record and the credential file (client secret or
/// service-account key, depending on the mode) live under a single
/// credentials directory.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth scopes to request. Must be non-empty.
    pub scopes: Vec<String>,

    /// Credential kind to resolve.
    pub mode: CredentialMode,

    /// Directory holding the token record and credential files.
    pub credentials_dir: PathBuf,

    /// Token record filename within `credentials_dir`.
    pub token_filename: String,

    /// Client-secret or service-account key filename within `credentials_dir`.
    pub credentials_filename: String,

    /// Identity to impersonate (service-account delegation).
    pub subject: Option<String>,

    /// Request timeout for token-endpoint calls.
    pub timeout: Duration,

    /// Port range for the loopback consent redirect.
    pub loopback_port_range: (u16, u16),
}

impl AuthConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default scope for full calendar access.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";

    /// Creates a configuration requesting the given scopes.
    pub fn new(scopes: Vec<String>) -> Self {
        Self {
            scopes,
            mode: CredentialMode::default(),
            credentials_dir: Self::default_credentials_dir(),
            token_filename: "token.json".to_string(),
            credentials_filename: "credentials.json".to_string(),
            subject: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            loopback_port_range: (8080, 8090),
        }
    }

    /// Returns the default credentials directory (`~/.config/calgate`).
    pub fn default_credentials_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calgate")
    }

    /// Sets the credential mode.
    pub fn with_mode(mut self, mode: CredentialMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the credentials directory.
    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    /// Sets the token record filename.
    pub fn with_token_filename(mut self, filename: impl Into<String>) -> Self {
        self.token_filename = filename.into();
        self
    }

    /// Sets the credential file filename.
    pub fn with_credentials_filename(mut self, filename: impl Into<String>) -> Self {
        self.credentials_filename = filename.into();
        self
    }

    /// Sets the identity to impersonate.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the loopback port range for the consent redirect.
    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    /// Returns the token record path.
    pub fn token_path(&self) -> PathBuf {
        self.credentials_dir.join(&self.token_filename)
    }

    /// Returns the client-secret or service-account key path.
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_dir.join(&self.credentials_filename)
    }

    /// Validates the configuration.
    ///
    /// An empty scope set is rejected here, before any file or network
    /// access happens.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.scopes.is_empty() {
            return Err(ServiceError::configuration(
                "at least one OAuth scope is required",
            ));
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(ServiceError::configuration("invalid loopback port range"));
        }
        Ok(())
    }
}

/// OAuth client descriptor issued by the identity provider.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

/// Structure of the provider-issued client-secret JSON file.
///
/// Accepts the console download format with an "installed" or "web"
/// section, and the flat format with client_id/client_secret at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<NestedSecret>,
    web: Option<NestedSecret>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedSecret {
    client_id: String,
    client_secret: String,
}

impl ClientSecret {
    /// Creates a client secret from raw values.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads a client secret from a provider-issued JSON file.
    pub fn from_file(path: &std::path::Path) -> ServiceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::configuration(format!("failed to read client secret file: {e}"))
        })?;
        Self::from_json(&content)
    }

    /// Parses a client secret from a JSON string.
    pub fn from_json(json: &str) -> ServiceResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(json).map_err(|e| {
            ServiceError::configuration(format!("failed to parse client secret: {e}"))
        })?;

        if let Some(secret) = file.installed.or(file.web) {
            return Ok(Self::new(secret.client_id, secret.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ServiceError::configuration(
            "client secret must contain an 'installed'/'web' section \
             or 'client_id'/'client_secret' at the root",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceErrorCode;

    fn test_scopes() -> Vec<String> {
        vec![AuthConfig::DEFAULT_SCOPE.to_string()]
    }

    #[test]
    fn config_defaults() {
        let config = AuthConfig::new(test_scopes());
        assert_eq!(config.mode, CredentialMode::InteractiveUser);
        assert_eq!(config.token_filename, "token.json");
        assert_eq!(config.credentials_filename, "credentials.json");
        assert!(config.subject.is_none());
    }

    #[test]
    fn empty_scopes_fail_validation() {
        let config = AuthConfig::new(vec![]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), ServiceErrorCode::Configuration);
    }

    #[test]
    fn invalid_port_range_fails_validation() {
        let config = AuthConfig::new(test_scopes()).with_loopback_port_range(9000, 8000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn paths_join_the_credentials_dir() {
        let config = AuthConfig::new(test_scopes())
            .with_credentials_dir("/srv/calgate")
            .with_token_filename("calendar-token.json")
            .with_credentials_filename("sa-key.json");

        assert_eq!(
            config.token_path(),
            PathBuf::from("/srv/calgate/calendar-token.json")
        );
        assert_eq!(
            config.credentials_path(),
            PathBuf::from("/srv/calgate/sa-key.json")
        );
    }

    #[test]
    fn builder_methods() {
        let config = AuthConfig::new(test_scopes())
            .with_mode(CredentialMode::ServiceAccount)
            .with_subject("calendar-robot@example.com")
            .with_timeout(Duration::from_secs(60))
            .with_loopback_port_range(9000, 9010);

        assert_eq!(config.mode, CredentialMode::ServiceAccount);
        assert_eq!(
            config.subject.as_deref(),
            Some("calendar-robot@example.com")
        );
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.loopback_port_range, (9000, 9010));
    }

    #[test]
    fn client_secret_from_installed_section() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "project_id": "my-project"
            }
        }"#;

        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(secret.client_secret, "test-secret");
    }

    #[test]
    fn client_secret_from_web_section() {
        let json = r#"{
            "web": {
                "client_id": "web-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.client_id, "web-id.apps.googleusercontent.com");
    }

    #[test]
    fn client_secret_from_flat_format() {
        let json = r#"{
            "client_id": "flat-id.apps.googleusercontent.com",
            "client_secret": "flat-secret"
        }"#;

        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.client_id, "flat-id.apps.googleusercontent.com");
        assert_eq!(secret.client_secret, "flat-secret");
    }

    #[test]
    fn client_secret_rejects_unknown_shapes() {
        assert!(ClientSecret::from_json(r#"{ "other": {} }"#).is_err());
        assert!(ClientSecret::from_json("not json").is_err());
    }
}
