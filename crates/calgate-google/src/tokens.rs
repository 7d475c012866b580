//! Credential material and the persisted token record.
//!
//! User credentials are cached on disk in the identity provider's
//! authorized-user JSON schema so that the record stays interchangeable
//! with other tooling reading the same file. Service-account credentials
//! are never persisted.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ClientSecret;
use crate::error::{ServiceError, ServiceResult};

/// Buffer subtracted from fresh token lifetimes so a credential refreshes
/// slightly before it actually lapses.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Resolved, ready-to-use credential material.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens, if granted.
    pub refresh_token: Option<String>,

    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    pub scopes: Vec<String>,

    /// Impersonated identity, if any (service-account delegation).
    pub subject: Option<String>,
}

impl Credential {
    /// Creates a credential from token-endpoint response data.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let expires_at = expires_in_secs
            .map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_SKEW_SECS));

        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            scopes,
            subject: None,
        }
    }

    /// Binds an impersonated identity to the credential.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Returns true if the access token is expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            // No expiry recorded: assume still valid.
            None => false,
        }
    }
}

/// On-disk token record, in the identity provider's authorized-user schema.
///
/// Read and written verbatim: fields this system does not interpret are
/// preserved across a load/store round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The access token.
    pub token: String,

    /// The long-lived refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token endpoint used for refresh grants.
    pub token_uri: String,

    /// OAuth client id the record was issued to.
    pub client_id: String,

    /// OAuth client secret paired with `client_id`.
    pub client_secret: String,

    /// Scopes granted to the token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Access token expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Uninterpreted fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    /// Builds a record from a freshly obtained credential.
    pub fn from_credential(
        credential: &Credential,
        secret: &ClientSecret,
        token_uri: impl Into<String>,
    ) -> Self {
        Self {
            token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            token_uri: token_uri.into(),
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes: credential.scopes.clone(),
            expiry: credential.expires_at,
            extra: Map::new(),
        }
    }

    /// Converts the record into a usable credential.
    pub fn to_credential(&self) -> Credential {
        Credential {
            access_token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expiry,
            scopes: self.scopes.clone(),
            subject: None,
        }
    }

    /// Returns true if the recorded access token is expired.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() >= expiry,
            None => false,
        }
    }
}

/// File-backed token record storage.
///
/// A single resolver owns a given record file; there is no cross-process
/// locking.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the record, or `None` when no file exists.
    pub fn load(&self) -> ServiceResult<Option<TokenRecord>> {
        if !self.path.exists() {
            debug!("no token record at {:?}", self.path);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ServiceError::configuration(format!("failed to read token record: {e}"))
        })?;

        let record: TokenRecord = serde_json::from_str(&content).map_err(|e| {
            ServiceError::configuration(format!("failed to parse token record: {e}"))
        })?;

        debug!("loaded token record from {:?}", self.path);
        Ok(Some(record))
    }

    /// Saves the record, replacing any previous content.
    ///
    /// The parent directory is created if needed and the write goes
    /// through a temp file plus rename so a crash never leaves a
    /// half-written record.
    pub fn save(&self, record: &TokenRecord) -> ServiceResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ServiceError::configuration(format!("failed to create token directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(record).map_err(|e| {
            ServiceError::configuration(format!("failed to serialize token record: {e}"))
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ServiceError::configuration(format!("failed to write token record: {e}"))
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ServiceError::configuration(format!("failed to rename token record: {e}"))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!("saved token record to {:?}", self.path);
        Ok(())
    }

    /// Returns the record path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
