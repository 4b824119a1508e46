use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while obtaining or caching OAuth credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// OAuth client configuration is missing or unusable
    #[error("OAuth 2.0 client configuration error: {0}")]
    Config(String),

    /// The default credential directory could not be located
    #[error("Unable to get path to cached credential file: {0}")]
    PathResolution(String),

    /// No cached token could be opened
    #[error("Cached credential file '{}' could not be opened: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cached token exists but is malformed or unusable
    #[error("Cached credential file '{}' is invalid: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// The token could not be written to the cache
    #[error("Unable to cache OAuth token to '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache missed and interactive authorization was disabled
    #[error("User authorization required, got: {0}")]
    AuthorizationRequired(#[source] Box<AuthError>),

    /// The authorization code could not be read from the terminal
    #[error("Unable to read authorization code: {0}")]
    Input(#[source] std::io::Error),

    /// The local callback listener could not be bound
    #[error("Unable to start callback listener on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The browser could not be opened at the authorization URL
    #[error("Unable to open authorization URL in browser: {0}")]
    BrowserLaunch(#[source] std::io::Error),

    /// The callback delivered an error instead of a code
    #[error("Authorization callback failed: {0}")]
    Callback(String),

    /// No callback arrived within the configured bound
    #[error("Timed out after {0:?} waiting for the authorization callback")]
    CallbackTimeout(std::time::Duration),

    /// The authorization code could not be exchanged for a token
    #[error("Unable to retrieve token: {reason}")]
    Exchange {
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The refresh token grant failed
    #[error("Unable to refresh token: {reason}")]
    Refresh {
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },
}

impl AuthError {
    /// Whether this error means the cache held no usable token
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, AuthError::NotFound { .. } | AuthError::Decode { .. })
    }

    pub(crate) fn exchange(reason: impl Into<String>, source: reqwest::Error) -> Self {
        AuthError::Exchange {
            reason: reason.into(),
            source: Some(source),
        }
    }

    pub(crate) fn refresh(reason: impl Into<String>, source: reqwest::Error) -> Self {
        AuthError::Refresh {
            reason: reason.into(),
            source: Some(source),
        }
    }
}
