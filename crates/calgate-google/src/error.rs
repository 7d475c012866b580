//! Error types for credential resolution and calendar queries.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// The category of a service error.
///
/// Classifies failures for logging and for the retry policy: only
/// rate-limit responses are transient, everything else is permanent for
/// the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorCode {
    /// Invalid construction-time input, e.g. an empty scope set.
    Configuration,
    /// A required credential file is absent.
    MissingCredentialFile,
    /// The identity provider rejected a token request.
    AuthProvider,
    /// Rate limit exceeded - too many requests.
    RateLimited,
    /// The retry budget was exhausted without a successful call.
    RetryExhausted,
    /// Non-retryable failure from the query endpoint.
    RemoteQuery,
}

impl ServiceErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Returns a machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::MissingCredentialFile => "missing_credential_file",
            Self::AuthProvider => "auth_provider_error",
            Self::RateLimited => "rate_limited",
            Self::RetryExhausted => "retry_exhausted",
            Self::RemoteQuery => "remote_query_error",
        }
    }
}

impl fmt::Display for ServiceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from credential resolution or a calendar query.
#[derive(Debug, Error)]
pub struct ServiceError {
    /// The error code categorizing this error.
    code: ServiceErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// How many attempts were made, for retry-exhaustion errors.
    attempts: Option<u32>,
    /// The underlying cause of this error, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ServiceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            attempts: None,
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorCode::Configuration, message)
    }

    /// Creates a missing-credential-file error for the given path.
    pub fn missing_credential_file(path: &Path) -> Self {
        Self::new(
            ServiceErrorCode::MissingCredentialFile,
            format!("credential file not found at {}", path.display()),
        )
    }

    /// Creates an identity-provider error.
    pub fn auth_provider(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorCode::AuthProvider, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorCode::RateLimited, message)
    }

    /// Creates a retry-exhaustion error carrying the attempt count.
    pub fn retry_exhausted(attempts: u32) -> Self {
        let mut err = Self::new(
            ServiceErrorCode::RetryExhausted,
            format!("max retries ({attempts}) exceeded"),
        );
        err.attempts = Some(attempts);
        err
    }

    /// Creates a remote query error.
    pub fn remote_query(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorCode::RemoteQuery, message)
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ServiceErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the attempt count, if this is a retry-exhaustion error.
    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for credential and calendar operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn only_rate_limits_are_retryable() {
        assert!(ServiceErrorCode::RateLimited.is_retryable());
        assert!(!ServiceErrorCode::Configuration.is_retryable());
        assert!(!ServiceErrorCode::MissingCredentialFile.is_retryable());
        assert!(!ServiceErrorCode::AuthProvider.is_retryable());
        assert!(!ServiceErrorCode::RetryExhausted.is_retryable());
        assert!(!ServiceErrorCode::RemoteQuery.is_retryable());
    }

    #[test]
    fn code_names() {
        assert_eq!(
            ServiceErrorCode::MissingCredentialFile.as_str(),
            "missing_credential_file"
        );
        assert_eq!(ServiceErrorCode::RateLimited.as_str(), "rate_limited");
    }

    #[test]
    fn error_creation() {
        let err = ServiceError::auth_provider("token grant rejected");
        assert_eq!(err.code(), ServiceErrorCode::AuthProvider);
        assert_eq!(err.message(), "token grant rejected");
        assert!(err.attempts().is_none());
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_credential_file_names_the_path() {
        let path = PathBuf::from("/etc/calgate/credentials.json");
        let err = ServiceError::missing_credential_file(&path);
        assert_eq!(err.code(), ServiceErrorCode::MissingCredentialFile);
        assert!(err.message().contains("/etc/calgate/credentials.json"));
    }

    #[test]
    fn retry_exhausted_carries_attempts() {
        let err = ServiceError::retry_exhausted(10);
        assert_eq!(err.code(), ServiceErrorCode::RetryExhausted);
        assert_eq!(err.attempts(), Some(10));
        assert!(err.message().contains("10"));
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ServiceError::rate_limited("too many requests");
        let display = format!("{}", err);
        assert!(display.contains("rate_limited"));
        assert!(display.contains("too many requests"));
    }

    #[test]
    fn error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ServiceError::configuration("failed to persist record").with_source(io_err);
        assert!(err.source().is_some());
    }
}
