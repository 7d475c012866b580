//! Interactive consent flow and refresh grant.
//!
//! User credentials come from the OAuth 2.0 Authorization Code flow with
//! PKCE (RFC 7636) and a loopback redirect: a local HTTP listener catches
//! the consent redirect, the authorization code is exchanged (together
//! with the code verifier) for tokens, and expired access tokens are later
//! renewed through the refresh-token grant. Only the documented grant
//! requests are issued here; the token exchange itself is the identity
//! provider's business.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::ClientSecret;
use crate::error::{ServiceError, ServiceResult};
use crate::tokens::Credential;

/// Authorization endpoint for the consent page.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and refresh grants.
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long to wait for the user to complete the consent page.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// OAuth client for interactive user credentials.
#[derive(Debug)]
pub struct OAuthClient {
    secret: ClientSecret,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client for the given client secret.
    pub fn new(secret: ClientSecret, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            secret,
            http_client,
        }
    }

    /// Runs the consent flow and returns the obtained credential.
    ///
    /// Binds a loopback listener, sends the user's browser to the consent
    /// page, waits for the redirect carrying the authorization code, and
    /// exchanges the code for tokens.
    ///
    /// # Errors
    ///
    /// Fails when no loopback port is available, the user denies consent,
    /// the redirect never arrives, or the identity provider rejects the
    /// code exchange.
    pub async fn authorize(
        &self,
        scopes: &[String],
        port_range: (u16, u16),
    ) -> ServiceResult<Credential> {
        let pkce = Pkce::new();

        let (listener, port) = Self::bind_loopback(port_range)?;
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");

        let auth_url = pkce.authorization_url(&self.secret.client_id, &redirect_uri, scopes);

        info!("starting consent flow, opening browser");
        debug!("authorization URL: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            warn!("failed to open browser: {}", e);
            eprintln!("\nOpen this URL in your browser to continue:\n\n{auth_url}\n");
        }

        let (code, received_state) = Self::wait_for_callback(listener)?;

        if received_state != pkce.state {
            return Err(ServiceError::auth_provider(
                "consent state mismatch - possible CSRF attack",
            ));
        }

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await
    }

    /// Renews an expired access token through the refresh-token grant.
    ///
    /// The grant goes to the token endpoint recorded with the credential,
    /// so cached records keep refreshing against the endpoint that issued
    /// them. Returns the new access token and its lifetime in seconds.
    pub async fn refresh(
        &self,
        token_uri: &str,
        refresh_token: &str,
    ) -> ServiceResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::auth_provider(format!("token refresh request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ServiceError::auth_provider(format!("failed to read token response: {e}"))
        })?;

        if !status.is_success() {
            return Err(ServiceError::auth_provider(format!(
                "token refresh rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::auth_provider(format!("invalid token response: {e}")))?;

        info!("refreshed access token");
        Ok((token.access_token, token.expires_in))
    }

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ServiceResult<Credential> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::auth_provider(format!("token exchange request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ServiceError::auth_provider(format!("failed to read token response: {e}"))
        })?;

        if !status.is_success() {
            return Err(ServiceError::auth_provider(format!(
                "token exchange rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::auth_provider(format!("invalid token response: {e}")))?;

        info!("obtained user tokens");
        Ok(Credential::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
            scopes.to_vec(),
        ))
    }

    /// Binds a TCP listener on the first free port in the given range.
    fn bind_loopback(port_range: (u16, u16)) -> ServiceResult<(TcpListener, u16)> {
        for port in port_range.0..=port_range.1 {
            if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{port}")) {
                debug!("bound loopback listener on port {}", port);
                return Ok((listener, port));
            }
        }
        Err(ServiceError::configuration(format!(
            "no available loopback port in range {}-{}",
            port_range.0, port_range.1
        )))
    }

    /// Waits for the consent redirect and extracts the authorization code.
    fn wait_for_callback(listener: TcpListener) -> ServiceResult<(String, String)> {
        listener
            .set_nonblocking(false)
            .map_err(|e| ServiceError::configuration(format!("failed to set blocking: {e}")))?;

        let (tx, rx) = mpsc::channel();

        // Accept in a separate thread so the wait can time out.
        let _handle = thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = Self::handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
        });

        match rx.recv_timeout(CALLBACK_TIMEOUT) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ServiceError::auth_provider("consent callback timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ServiceError::auth_provider(
                "consent callback channel disconnected",
            )),
        }
    }

    /// Handles one HTTP request on the loopback listener.
    ///
    /// Returns `None` for requests that are not the consent redirect
    /// (favicon probes and the like), so the accept loop keeps waiting.
    fn handle_callback(mut stream: TcpStream) -> Option<ServiceResult<(String, String)>> {
        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();

        if reader.read_line(&mut request_line).is_err() {
            return None;
        }

        // Request line: GET /callback?code=...&state=... HTTP/1.1
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 || parts[0] != "GET" {
            return None;
        }

        let path = parts[1];
        if !path.starts_with("/callback") {
            return None;
        }

        let query_start = path.find('?').map(|i| i + 1).unwrap_or(path.len());
        let query = &path[query_start..];

        let mut code = None;
        let mut state = None;
        let mut denial = None;

        for param in query.split('&') {
            let mut kv = param.splitn(2, '=');
            if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
                let value = urlencoding::decode(value).unwrap_or_default().into_owned();
                match key {
                    "code" => code = Some(value),
                    "state" => state = Some(value),
                    "error" => denial = Some(value),
                    _ => {}
                }
            }
        }

        let response = if denial.is_some() || code.is_none() {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Failed</h1>\
            <p>You can close this window.</p></body></html>"
        } else {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Successful</h1>\
            <p>You can close this window and return to the terminal.</p></body></html>"
        };

        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();

        if let Some(denial) = denial {
            return Some(Err(ServiceError::auth_provider(format!(
                "authorization denied: {denial}"
            ))));
        }

        match (code, state) {
            (Some(c), Some(s)) => Some(Ok((c, s))),
            (Some(c), None) => Some(Ok((c, String::new()))),
            _ => Some(Err(ServiceError::auth_provider(
                "missing authorization code in callback",
            ))),
        }
    }
}

/// PKCE verifier/challenge pair plus the CSRF state (RFC 7636).
#[derive(Debug)]
pub struct Pkce {
    /// High-entropy random code verifier.
    pub verifier: String,
    /// SHA-256 challenge of the verifier, base64url encoded.
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl Pkce {
    /// Creates a fresh verifier, challenge, and state.
    pub fn new() -> Self {
        let verifier = Self::random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::random_token(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn random_token(bytes: usize) -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..bytes).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the consent-page URL for the given client and scopes.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for Pkce {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body from the token endpoint.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn verifier_has_expected_length() {
        let pkce = Pkce::new();
        // 32 bytes base64url-encoded without padding = 43 characters.
        assert_eq!(pkce.verifier.len(), 43);
    }

    #[test]
    fn challenge_is_deterministic() {
        let challenge1 = Pkce::compute_challenge("some-verifier");
        let challenge2 = Pkce::compute_challenge("some-verifier");
        assert_eq!(challenge1, challenge2);
    }

    #[test]
    fn fresh_flows_do_not_collide() {
        let a = Pkce::new();
        let b = Pkce::new();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn authorization_url_format() {
        let pkce = Pkce::new();
        let url = pkce.authorization_url(
            "test-client.apps.googleusercontent.com",
            "http://127.0.0.1:8080/callback",
            &["https://www.googleapis.com/auth/calendar".to_string()],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id="));
        assert!(url.contains("redirect_uri="));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state="));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[tokio::test]
    async fn refresh_returns_new_access_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthClient::new(
            ClientSecret::new("client-id", "client-secret"),
            Duration::from_secs(5),
        );
        let token_uri = format!("{}/token", server.uri());

        let (access_token, expires_in) = client.refresh(&token_uri, "old-refresh").await.unwrap();
        assert_eq!(access_token, "new-access");
        assert_eq!(expires_in, Some(3600));
    }

    #[tokio::test]
    async fn refresh_rejection_is_an_auth_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(
            ClientSecret::new("client-id", "client-secret"),
            Duration::from_secs(5),
        );
        let token_uri = format!("{}/token", server.uri());

        let err = client.refresh(&token_uri, "revoked").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ServiceErrorCode::AuthProvider);
        assert!(err.message().contains("invalid_grant"));
    }
}
