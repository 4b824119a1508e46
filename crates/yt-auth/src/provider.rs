//! Cache-first credential acquisition.
//!
//! Each call walks `Start -> CacheHit | CacheMiss`, and on a miss either fails
//! (non-interactive) or authorizes, persists, and returns. Failures are final for
//! the call; nothing is retried.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::authorizer::InteractiveAuthorizer;
use crate::client::AuthenticatedClient;
use crate::config::CredentialOptions;
use crate::console::{Console, TerminalConsole};
use crate::error::AuthError;
use crate::store::TokenStore;
use crate::token::OAuthToken;

/// Hands out authenticated clients, authorizing the user only when the cache cannot
pub struct CredentialProvider<C = TerminalConsole> {
    http: reqwest::Client,
    console: C,
    home_dir: Option<PathBuf>,
}

impl CredentialProvider {
    pub fn new() -> Self {
        Self::with_console(TerminalConsole)
    }
}

impl Default for CredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Console> CredentialProvider<C> {
    pub fn with_console(console: C) -> Self {
        Self {
            http: reqwest::Client::new(),
            console,
            home_dir: dirs::home_dir(),
        }
    }

    /// Use `http` for token endpoint calls and the returned client
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Override the home directory the default cache location is derived from
    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    /// Return a client authorized for `scope`, from cache when possible
    pub async fn get_client(
        &self,
        scope: &str,
        options: &CredentialOptions,
    ) -> Result<AuthenticatedClient, AuthError> {
        let base = options
            .client_config
            .as_ref()
            .ok_or_else(|| AuthError::Config("OAuth2 config not present".to_string()))?;
        let config = base
            .with_scope(scope)
            .with_redirect_uri(options.strategy.redirect_uri());

        let store =
            TokenStore::resolve_in(options.secrets_path.as_deref(), self.home_dir.clone())?;

        let token = match load_usable(&store) {
            Ok(token) => {
                info!("Using cached credentials");
                token
            }
            Err(miss) if options.skip_interactive_auth => {
                debug!("Cache miss with interactive authorization disabled: {}", miss);
                return Err(AuthError::AuthorizationRequired(Box::new(miss)));
            }
            Err(miss) => {
                if matches!(miss, AuthError::Decode { .. }) {
                    warn!("{}", miss);
                }
                info!("No usable cached credentials, starting authorization");

                let authorizer =
                    InteractiveAuthorizer::new(&self.http, &self.console, options.strategy)
                        .with_callback_timeout(options.callback_timeout);
                let token = authorizer.authorize(&config).await?;

                info!("Saving credential file to: {}", store.path().display());
                store.save(&token)?;
                token
            }
        };

        Ok(AuthenticatedClient::new(self.http.clone(), config, token))
    }
}

/// Load the cached token, treating one that can no longer authorize as a miss
fn load_usable(store: &TokenStore) -> Result<OAuthToken, AuthError> {
    let token = store.load()?;
    if !token.is_usable() {
        return Err(AuthError::Decode {
            path: store.path().to_path_buf(),
            reason: "token is expired and has no refresh token".to_string(),
        });
    }
    Ok(token)
}
