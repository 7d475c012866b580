//! Google credential resolution and calendar queries.
//!
//! This crate obtains and refreshes OAuth2 user or service-account
//! credentials, wraps remote calls in bounded exponential-backoff retry,
//! and exposes a single filtered, paginated event-listing call:
//!
//! - [`CredentialResolver`] - produces a valid credential for a scope set
//!   and mode, caching user tokens in an on-disk [`TokenRecord`]
//! - [`execute_with_backoff`] - retries rate-limited calls under a
//!   [`RetryPolicy`]
//! - [`CalendarService`] - the authenticated query facade
//! - [`ServiceError`] - the error taxonomy shared by all of the above
//!
//! The identity provider's token protocols and the calendar API are
//! external collaborators: this crate conforms to their wire formats but
//! does not reimplement them.
//!
//! # Example
//!
//! ```ignore
//! use calgate_google::{AuthConfig, CalendarService, CredentialMode, EventQuery};
//!
//! let config = AuthConfig::new(vec![AuthConfig::DEFAULT_SCOPE.to_string()])
//!     .with_mode(CredentialMode::ServiceAccount)
//!     .with_subject("calendar-robot@example.com");
//!
//! let service = CalendarService::connect(config).await?;
//! let page = service.list_events(&EventQuery::new("primary", from, to)).await?;
//! ```

pub mod calendar;
pub mod config;
pub mod error;
pub mod oauth;
pub mod resolver;
pub mod retry;
pub mod service_account;
pub mod tokens;

// Re-export main types at crate root
pub use calendar::{CalendarService, EventPage, EventQuery};
pub use config::{AuthConfig, ClientSecret, CredentialMode};
pub use error::{ServiceError, ServiceErrorCode, ServiceResult};
pub use oauth::{OAuthClient, Pkce};
pub use resolver::CredentialResolver;
pub use retry::{RetryPolicy, execute_with_backoff};
pub use service_account::{ServiceAccountFlow, ServiceAccountKey};
pub use tokens::{Credential, TokenRecord, TokenStore};
