use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AuthError;

/// Redirect target for installed applications that paste the code by hand
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Default port of the local callback listener
pub const OAUTH_CALLBACK_PORT: u16 = 8090;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scope for managing the user's YouTube account
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

const MISSING_CLIENT_SECRETS: &str = "\
Please configure OAuth 2.0.
Populate the client_secrets.json file with the OAuth client credentials
downloaded from the Google Cloud Console (https://cloud.google.com/console).
Use an \"installed application\" client for the prompt strategy and a
\"web application\" client with a matching redirect URI for the local callback
strategy.";

/// OAuth configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// OAuth scope(s)
    pub scopes: Vec<String>,
    /// Redirect URI sent with the authorization request and the code exchange
    pub redirect_uri: String,
    /// Authorization endpoint the user is sent to
    pub auth_uri: String,
    /// Token endpoint for code exchange and refresh
    pub token_uri: String,
}

impl OAuthClientConfig {
    /// Create new OAuth configuration with YouTube defaults
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: vec![YOUTUBE_SCOPE.to_string()],
            redirect_uri: OOB_REDIRECT_URI.to_string(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
        }
    }

    /// Load a `client_secrets.json` file as downloaded from the Google Cloud Console
    pub fn from_client_secrets_file(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Config(format!(
                "unable to read client secrets file '{}': {}\n{}",
                path.display(),
                e,
                MISSING_CLIENT_SECRETS
            ))
        })?;
        Self::from_client_secrets_json(&content).map_err(|e| {
            AuthError::Config(format!(
                "unable to parse client secrets file '{}': {}\n{}",
                path.display(),
                e,
                MISSING_CLIENT_SECRETS
            ))
        })
    }

    pub fn from_client_secrets_json(content: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or("expected an \"installed\" or \"web\" client entry")?;

        let mut config = Self::new(secrets.client_id, secrets.client_secret);
        if let Some(auth_uri) = secrets.auth_uri {
            config.auth_uri = auth_uri;
        }
        if let Some(token_uri) = secrets.token_uri {
            config.token_uri = token_uri;
        }
        if let Some(redirect_uri) = secrets.redirect_uris.into_iter().next() {
            config.redirect_uri = redirect_uri;
        }
        Ok(config)
    }

    /// Derive a configuration that redirects to `redirect_uri`
    pub fn with_redirect_uri(&self, redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..self.clone()
        }
    }

    /// Derive a configuration requesting the space-separated `scope`.
    /// An empty scope keeps the configured ones.
    pub fn with_scope(&self, scope: &str) -> Self {
        let scopes: Vec<String> = scope.split_whitespace().map(str::to_string).collect();
        if scopes.is_empty() {
            return self.clone();
        }
        Self {
            scopes,
            ..self.clone()
        }
    }

    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// How the authorization code is obtained from the user.
///
/// Tied to how the OAuth client was registered: `Prompt` needs an installed
/// application client, `LocalCallback` a web application client whose redirect
/// URI matches the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStrategy {
    /// Print the authorization URL and read the code from the terminal
    #[default]
    Prompt,
    /// Open the browser and receive the code on a local listener
    LocalCallback { port: u16 },
}

impl AuthStrategy {
    pub fn local_callback() -> Self {
        AuthStrategy::LocalCallback {
            port: OAUTH_CALLBACK_PORT,
        }
    }

    /// Redirect URI this strategy expects the provider to use
    pub fn redirect_uri(&self) -> String {
        match self {
            AuthStrategy::Prompt => OOB_REDIRECT_URI.to_string(),
            AuthStrategy::LocalCallback { port } => format!("http://127.0.0.1:{}", port),
        }
    }
}

/// Options for obtaining an authenticated client
#[derive(Debug, Clone, Default)]
pub struct CredentialOptions {
    /// Directory holding the cached token, `~/.credentials` when unset
    pub secrets_path: Option<PathBuf>,
    /// Fail instead of asking the user when no usable token is cached
    pub skip_interactive_auth: bool,
    pub client_config: Option<OAuthClientConfig>,
    pub strategy: AuthStrategy,
    /// Bound on waiting for the browser callback, unbounded when unset
    pub callback_timeout: Option<Duration>,
}
