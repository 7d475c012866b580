//! Calendar query facade.
//!
//! A thin, authenticated wrapper over the provider's `events.list`
//! endpoint: one time-bounded, filtered, paginated request per call, with
//! the response page passed through unmodified. Pagination traversal and
//! event interpretation are the caller's business.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use calgate_core::{Event, EventLogger};

use crate::config::AuthConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::resolver::CredentialResolver;
use crate::retry::{RetryPolicy, execute_with_backoff};

/// Base URL for the Calendar API v3.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Parameters for a single event-listing call.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Calendar identifier (e.g. "primary").
    pub calendar_id: String,

    /// Lower bound for event start time.
    pub time_min: DateTime<Utc>,

    /// Upper bound for event start time.
    pub time_max: DateTime<Utc>,

    /// Maximum number of events per page.
    pub max_results: u32,

    /// Free-text search filter.
    pub search_query: Option<String>,

    /// Continuation token from a previous page.
    pub page_token: Option<String>,

    /// Whether to expand recurring events into single instances.
    pub single_events: bool,

    /// Sort order of returned events.
    pub order_by: String,
}

impl EventQuery {
    /// Default page size.
    pub const DEFAULT_MAX_RESULTS: u32 = 100;

    /// Creates a query for the given calendar and time window.
    pub fn new(
        calendar_id: impl Into<String>,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            time_min,
            time_max,
            max_results: Self::DEFAULT_MAX_RESULTS,
            search_query: None,
            page_token: None,
            single_events: true,
            order_by: "startTime".to_string(),
        }
    }

    /// Sets the page size.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets a free-text search filter.
    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    /// Sets the continuation token.
    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    /// Sets whether recurring events are expanded.
    pub fn with_single_events(mut self, single_events: bool) -> Self {
        self.single_events = single_events;
        self
    }

    /// Sets the sort order.
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }
}

/// One page of the provider's event-listing response.
///
/// Items stay raw JSON values and unknown top-level fields are preserved,
/// so the page re-serializes to what the provider sent. The caller
/// decides whether to follow `next_page_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// The events on this page.
    #[serde(default)]
    pub items: Vec<Value>,

    /// Continuation token for the next page, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    /// Uninterpreted response fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Authenticated calendar query facade.
///
/// The credential is resolved once at construction; each call issues a
/// single listing request.
#[derive(Debug)]
pub struct CalendarService {
    http_client: reqwest::Client,
    access_token: String,
    api_base: String,
    logger: EventLogger,
}

impl CalendarService {
    /// Resolves a credential for `config` and builds the facade.
    pub async fn connect(config: AuthConfig) -> ServiceResult<Self> {
        let timeout = config.timeout;
        let resolver = CredentialResolver::new(config)?;
        let credential = resolver.resolve().await?;
        Ok(Self::with_access_token(credential.access_token, timeout))
    }

    /// Builds the facade from an already-resolved access token.
    pub fn with_access_token(access_token: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            access_token: access_token.into(),
            api_base: CALENDAR_API_BASE.to_string(),
            logger: EventLogger::new("calendar-service", "calgate", "google-calendar"),
        }
    }

    /// Overrides the API base URL. Tests point this at a local server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Lists one page of events.
    ///
    /// Rate-limit responses map to a retryable error; any other failure
    /// maps to a remote-query error. Failures are logged with the
    /// calendar id before propagating.
    pub async fn list_events(&self, query: &EventQuery) -> ServiceResult<EventPage> {
        let result = self.list_events_page(query).await;

        if let Err(ref err) = result {
            self.logger.error(
                Event::message("error retrieving events")
                    .with("calendar_id", query.calendar_id.as_str())
                    .with("error", err.to_string()),
            );
        }

        result
    }

    /// Lists one page of events, retrying rate-limited responses with
    /// exponential backoff.
    pub async fn list_events_with_backoff(
        &self,
        query: &EventQuery,
        policy: &RetryPolicy,
    ) -> ServiceResult<EventPage> {
        execute_with_backoff(policy, ServiceError::is_retryable, || {
            self.list_events(query)
        })
        .await
    }

    async fn list_events_page(&self, query: &EventQuery) -> ServiceResult<EventPage> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&query.calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", query.time_min.to_rfc3339()),
                ("timeMax", query.time_max.to_rfc3339()),
                ("maxResults", query.max_results.to_string()),
                ("singleEvents", query.single_events.to_string()),
                ("orderBy", query.order_by.clone()),
            ]);

        if let Some(ref q) = query.search_query {
            request = request.query(&[("q", q)]);
        }

        if let Some(ref token) = query.page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::remote_query("request timeout")
            } else {
                ServiceError::remote_query(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(ServiceError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {s} seconds"))
                    .unwrap_or_default()
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::remote_query(format!(
                "API error ({status}): {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::remote_query(format!("failed to read response: {e}")))?;

        let page: EventPage = serde_json::from_str(&body)
            .map_err(|e| ServiceError::remote_query(format!("failed to parse response: {e}")))?;

        debug!(
            "fetched {} events from calendar {}",
            page.items.len(),
            query.calendar_id
        );
        Ok(page)
    }
}
