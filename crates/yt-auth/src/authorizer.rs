use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::callback::CallbackListener;
use crate::config::{AuthStrategy, OAuthClientConfig};
use crate::console::Console;
use crate::error::AuthError;
use crate::token::OAuthToken;

/// Generate PKCE verifier and challenge
pub fn generate_pkce() -> (String, String) {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::{Digest, Sha256};

    // 64 characters, within the 43-128 range allowed for verifiers
    let verifier = random_alphanumeric(64);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (verifier, challenge)
}

/// Generate an opaque anti-forgery state value
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

fn random_alphanumeric(len: usize) -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Build the authorization URL requesting offline access
pub fn authorization_url(config: &OAuthClientConfig, state: &str, challenge: &str) -> String {
    format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}&\
        code_challenge={}&\
        code_challenge_method=S256&\
        access_type=offline&\
        prompt=consent",
        config.auth_uri,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scope_param()),
        urlencoding::encode(state),
        urlencoding::encode(challenge),
    )
}

/// A pending authorization: the URL to visit plus the values needed to finish it
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    verifier: String,
}

impl AuthorizationRequest {
    pub fn new(config: &OAuthClientConfig) -> Self {
        Self::with_state(config, generate_state())
    }

    /// Build a request around a state value chosen by the caller
    pub fn with_state(config: &OAuthClientConfig, state: String) -> Self {
        let (verifier, challenge) = generate_pkce();
        let url = authorization_url(config, &state, &challenge);
        Self {
            url,
            state,
            verifier,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }
}

/// Successful response of the token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert into a token, keeping `previous_refresh` when none was issued.
    /// Fails when `expires_in` does not yield a representable expiry.
    pub(crate) fn into_token(
        self,
        previous_refresh: Option<String>,
    ) -> Result<OAuthToken, String> {
        let expiry = match self.expires_in {
            Some(secs) => Some(
                chrono::Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| format!("invalid expires_in: {}", secs))?,
            ),
            None => None,
        };

        Ok(OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry,
        })
    }
}

/// Exchange authorization code for tokens
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthClientConfig,
    code: &str,
    verifier: &str,
) -> Result<OAuthToken, AuthError> {
    info!("Exchanging authorization code for tokens");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("code_verifier", verifier),
        ("grant_type", "authorization_code"),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];

    let response = http
        .post(&config.token_uri)
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::exchange("token endpoint unreachable", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Exchange {
            reason: format!("token endpoint returned {}: {}", status, body.trim()),
            source: None,
        });
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::exchange("malformed token response", e))?;

    let token = token_response
        .into_token(None)
        .map_err(|reason| AuthError::Exchange {
            reason,
            source: None,
        })?;

    info!("Successfully obtained OAuth tokens");

    Ok(token)
}

/// Obtains a fresh token by asking the user to authorize the application
pub struct InteractiveAuthorizer<'a> {
    http: &'a reqwest::Client,
    console: &'a dyn Console,
    strategy: AuthStrategy,
    callback_timeout: Option<Duration>,
}

impl<'a> InteractiveAuthorizer<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        console: &'a dyn Console,
        strategy: AuthStrategy,
    ) -> Self {
        Self {
            http,
            console,
            strategy,
            callback_timeout: None,
        }
    }

    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Run the three-legged flow end to end
    pub async fn authorize(&self, config: &OAuthClientConfig) -> Result<OAuthToken, AuthError> {
        match self.strategy {
            AuthStrategy::Prompt => {
                info!("Trying to get token from prompt");
                let request = AuthorizationRequest::new(config);
                let code = self.code_from_prompt(&request.url).await?;
                exchange_code(self.http, config, &code, request.verifier()).await
            }
            AuthStrategy::LocalCallback { port } => {
                info!("Trying to get token from web");
                let state = generate_state();
                let listener = CallbackListener::bind(port, state.clone()).await?;
                let config = config.with_redirect_uri(listener.redirect_uri());
                let request = AuthorizationRequest::with_state(&config, state);

                debug!("Authorization URL: {}", request.url);
                self.console
                    .open_browser(&request.url)
                    .map_err(AuthError::BrowserLaunch)?;
                self.console.show(
                    "Your browser has been opened to an authorization URL. \
                    This program will resume once authorization has been provided.",
                );
                self.console.show(&request.url);

                let code = listener.wait_for_code(self.callback_timeout).await?;
                exchange_code(self.http, &config, &code, request.verifier()).await
            }
        }
    }

    async fn code_from_prompt(&self, auth_url: &str) -> Result<String, AuthError> {
        let message = format!(
            "Go to the following link in your browser. After completing the \
            authorization flow, enter the authorization code on the command line:\n\
            {}\nEnter the code here: ",
            auth_url
        );
        let line = self
            .console
            .prompt_line(&message)
            .await
            .map_err(AuthError::Input)?;

        line.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::Input(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no authorization code entered",
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OOB_REDIRECT_URI;
    use crate::testing::{ScriptedConsole, http, mock_config, query_param, token_endpoint};

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use sha2::{Digest, Sha256};

        let (verifier, challenge) = generate_pkce();

        assert_eq!(verifier.len(), 64);
        assert_eq!(
            challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
        );
    }

    #[test]
    fn authorization_url_requests_offline_access() {
        let config = OAuthClientConfig::new("client id", "secret");
        let url = authorization_url(&config, "state-token", "challenge");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert_eq!(query_param(&url, "access_type").as_deref(), Some("offline"));
        assert_eq!(query_param(&url, "client_id").as_deref(), Some("client id"));
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some(OOB_REDIRECT_URI)
        );
        assert_eq!(query_param(&url, "state").as_deref(), Some("state-token"));
        assert_eq!(
            query_param(&url, "scope").as_deref(),
            Some("https://www.googleapis.com/auth/youtube")
        );
    }

    #[test]
    fn requests_use_fresh_state() {
        let config = OAuthClientConfig::new("id", "secret");
        let first = AuthorizationRequest::new(&config);
        let second = AuthorizationRequest::new(&config);

        assert_ne!(first.state, second.state);
        assert_eq!(query_param(&first.url, "state"), Some(first.state.clone()));
    }

    #[tokio::test]
    async fn exchange_returns_token() {
        let server = token_endpoint("CODE1", "ya29.fresh").await;
        let config = mock_config(&server);

        let token = exchange_code(&http(), &config, "CODE1", "verifier")
            .await
            .unwrap();

        assert_eq!(token.access_token, "ya29.fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn rejected_code_is_exchange_error() {
        let server = token_endpoint("CODE1", "ya29.fresh").await;
        let config = mock_config(&server);

        let err = exchange_code(&http(), &config, "WRONG", "verifier")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Exchange { .. }));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn out_of_range_lifetime_is_exchange_error() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.fresh",
                "expires_in": i64::MAX,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        let config = mock_config(&server);

        let err = exchange_code(&http(), &config, "CODE1", "verifier")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Exchange { source: None, .. }));
        assert!(err.to_string().contains("invalid expires_in"));
    }

    #[test]
    fn request_carries_supplied_state() {
        let config = OAuthClientConfig::new("id", "secret");
        let request = AuthorizationRequest::with_state(&config, "chosen".to_string());

        assert_eq!(request.state, "chosen");
        assert_eq!(query_param(&request.url, "state").as_deref(), Some("chosen"));
    }

    #[tokio::test]
    async fn prompt_strategy_exchanges_entered_code() {
        let server = token_endpoint("CODE1", "ya29.prompted").await;
        let config = mock_config(&server);
        let console = ScriptedConsole::with_lines(&["  CODE1  \n"]);
        let http = http();

        let token = InteractiveAuthorizer::new(&http, &console, AuthStrategy::Prompt)
            .authorize(&config)
            .await
            .unwrap();

        assert_eq!(token.access_token, "ya29.prompted");
        let prompts = console.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("access_type=offline"));
        assert!(prompts[0].ends_with("Enter the code here: "));
        assert!(console.opened().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_input_error() {
        let config = OAuthClientConfig::new("id", "secret");
        let http = http();

        let blank = ScriptedConsole::with_lines(&["\n"]);
        let err = InteractiveAuthorizer::new(&http, &blank, AuthStrategy::Prompt)
            .authorize(&config)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Input(_)));

        let closed = ScriptedConsole::default();
        let err = InteractiveAuthorizer::new(&http, &closed, AuthStrategy::Prompt)
            .authorize(&config)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Input(_)));
    }

    #[tokio::test]
    async fn local_callback_strategy_receives_code_from_browser() {
        let server = token_endpoint("CB1", "ya29.callback").await;
        let config = mock_config(&server);
        let console = ScriptedConsole::answering_callback("CB1");
        let http = http();

        let token = InteractiveAuthorizer::new(
            &http,
            &console,
            AuthStrategy::LocalCallback { port: 0 },
        )
        .authorize(&config)
        .await
        .unwrap();

        assert_eq!(token.access_token, "ya29.callback");
        let opened = console.opened();
        assert_eq!(opened.len(), 1);
        let redirect = query_param(&opened[0], "redirect_uri").unwrap();
        assert!(redirect.starts_with("http://127.0.0.1:"));
        assert!(console.prompts().is_empty());
    }

    #[tokio::test]
    async fn browser_failure_is_reported_and_listener_released() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        drop(taken);

        let config = OAuthClientConfig::new("id", "secret");
        let console = ScriptedConsole::without_browser();
        let http = http();

        let err = InteractiveAuthorizer::new(&http, &console, AuthStrategy::LocalCallback { port })
            .authorize(&config)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::BrowserLaunch(_)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(CallbackListener::bind(port, generate_state()).await.is_ok());
    }

    #[tokio::test]
    async fn bounded_callback_wait_times_out() {
        let config = OAuthClientConfig::new("id", "secret");
        let console = ScriptedConsole::default();
        let http = http();

        let err = InteractiveAuthorizer::new(
            &http,
            &console,
            AuthStrategy::LocalCallback { port: 0 },
        )
        .with_callback_timeout(Some(Duration::from_millis(50)))
        .authorize(&config)
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::CallbackTimeout(_)));
        assert_eq!(console.opened().len(), 1);
    }
}
