use reqwest::{Method, RequestBuilder};
use tokio::sync::Mutex;
use tracing::info;

use crate::authorizer::TokenResponse;
use crate::config::OAuthClientConfig;
use crate::error::AuthError;
use crate::token::OAuthToken;

/// HTTP client that attaches the user's access token to outgoing requests.
///
/// Expired access tokens are refreshed in memory; refreshed tokens are not
/// written back to the cache.
#[derive(Debug)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    config: OAuthClientConfig,
    token: Mutex<OAuthToken>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, config: OAuthClientConfig, token: OAuthToken) -> Self {
        Self {
            http,
            config,
            token: Mutex::new(token),
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Snapshot of the current token
    pub async fn token(&self) -> OAuthToken {
        self.token.lock().await.clone()
    }

    /// Get valid access token, refreshing if necessary
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut token = self.token.lock().await;

        if token.is_expired() {
            let refresh_token = token.refresh_token.clone().ok_or_else(|| AuthError::Refresh {
                reason: "access token expired and no refresh token is available".to_string(),
                source: None,
            })?;
            info!("Access token expired, refreshing");
            *token = self.refresh(refresh_token).await?;
        }

        Ok(token.access_token.clone())
    }

    /// Start a request carrying the `Authorization` header
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, AuthError> {
        let access_token = self.access_token().await?;
        let scheme = self.token.lock().await.auth_scheme().to_string();
        Ok(self
            .http
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", scheme, access_token),
            ))
    }

    pub async fn get(&self, url: &str) -> Result<RequestBuilder, AuthError> {
        self.request(Method::GET, url).await
    }

    /// Refresh the access token using the refresh token
    async fn refresh(&self, refresh_token: String) -> Result<OAuthToken, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::refresh("token endpoint unreachable", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Refresh {
                reason: format!("token endpoint returned {}: {}", status, body.trim()),
                source: None,
            });
        }

        let refreshed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::refresh("malformed refresh response", e))?;

        // Keep existing refresh token
        let token = refreshed
            .into_token(Some(refresh_token))
            .map_err(|reason| AuthError::Refresh {
                reason,
                source: None,
            })?;

        info!("OAuth token refreshed successfully");

        Ok(token)
    }
}
