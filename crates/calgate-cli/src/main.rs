//! calgate CLI entry point.
//!
//! With no arguments this resolves a default service-account credential
//! and runs one fixed-parameter calendar query, printing the raw result
//! page on stdout. Flags override the query window, calendar, mode, and
//! credential locations.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{NaiveDate, NaiveTime};
use clap::Parser;

use calgate_core::{TracingConfig, init_tracing};
use calgate_google::{
    AuthConfig, CalendarService, CredentialMode, EventQuery, RetryPolicy, ServiceError,
    ServiceResult,
};

/// Query Google Calendar with resolver-managed credentials.
#[derive(Debug, Parser)]
#[command(name = "calgate", version, about)]
struct Cli {
    /// Calendar to query.
    #[arg(long, default_value = "primary")]
    calendar_id: String,

    /// Start of the query window (YYYY-MM-DD).
    #[arg(long, default_value = "2025-04-01")]
    date_from: NaiveDate,

    /// End of the query window (YYYY-MM-DD).
    #[arg(long, default_value = "2025-04-01")]
    date_to: NaiveDate,

    /// Maximum number of events per page.
    #[arg(long, default_value_t = 100)]
    max_results: u32,

    /// Free-text search filter.
    #[arg(long)]
    query: Option<String>,

    /// Continuation token from a previous result page.
    #[arg(long)]
    page_token: Option<String>,

    /// Resolve an interactive user credential instead of a service account.
    #[arg(long)]
    user: bool,

    /// Directory holding the token record and credential files.
    #[arg(long)]
    credentials_dir: Option<PathBuf>,

    /// Key or client-secret filename within the credentials directory.
    #[arg(long)]
    credentials_file: Option<String>,

    /// Identity to impersonate (service-account delegation).
    #[arg(long)]
    subject: Option<String>,

    /// OAuth scope to request (repeatable).
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: failed to initialize tracing: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServiceResult<()> {
    let scopes = if cli.scopes.is_empty() {
        vec![AuthConfig::DEFAULT_SCOPE.to_string()]
    } else {
        cli.scopes.clone()
    };

    let mode = if cli.user {
        CredentialMode::InteractiveUser
    } else {
        CredentialMode::ServiceAccount
    };

    let mut config = AuthConfig::new(scopes).with_mode(mode);
    if let Some(dir) = cli.credentials_dir {
        config = config.with_credentials_dir(dir);
    }
    if let Some(filename) = cli.credentials_file {
        config = config.with_credentials_filename(filename);
    }
    if let Some(subject) = cli.subject {
        config = config.with_subject(subject);
    }

    let service = CalendarService::connect(config).await?;

    let time_min = cli.date_from.and_time(NaiveTime::MIN).and_utc();
    let time_max = cli.date_to.and_time(NaiveTime::MIN).and_utc();

    let mut query = EventQuery::new(cli.calendar_id, time_min, time_max)
        .with_max_results(cli.max_results);
    if let Some(q) = cli.query {
        query = query.with_search_query(q);
    }
    if let Some(token) = cli.page_token {
        query = query.with_page_token(token);
    }

    let page = service
        .list_events_with_backoff(&query, &RetryPolicy::default())
        .await?;

    let rendered = serde_json::to_string_pretty(&page)
        .map_err(|e| ServiceError::remote_query(format!("failed to render result page: {e}")))?;
    println!("{rendered}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_fixed_query() {
        let cli = Cli::try_parse_from(["calgate"]).unwrap();
        assert_eq!(cli.calendar_id, "primary");
        assert_eq!(cli.date_from, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert_eq!(cli.date_to, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert_eq!(cli.max_results, 100);
        assert!(!cli.user);
        assert!(cli.scopes.is_empty());
    }

    #[test]
    fn flags_override_the_defaults() {
        let cli = Cli::try_parse_from([
            "calgate",
            "--calendar-id",
            "team@example.com",
            "--date-from",
            "2025-05-01",
            "--date-to",
            "2025-05-31",
            "--max-results",
            "50",
            "--query",
            "standup",
            "--user",
            "--subject",
            "robot@example.com",
            "--scope",
            "https://www.googleapis.com/auth/calendar.readonly",
        ])
        .unwrap();

        assert_eq!(cli.calendar_id, "team@example.com");
        assert_eq!(cli.max_results, 50);
        assert_eq!(cli.query.as_deref(), Some("standup"));
        assert!(cli.user);
        assert_eq!(cli.subject.as_deref(), Some("robot@example.com"));
        assert_eq!(cli.scopes.len(), 1);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(Cli::try_parse_from(["calgate", "--date-from", "April 1st"]).is_err());
    }
}
