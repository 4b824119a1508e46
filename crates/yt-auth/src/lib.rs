//! OAuth 2.0 credentials for YouTube command-line tools.
//!
//! [`CredentialProvider::get_client`] returns an [`AuthenticatedClient`] built from
//! a cached token when one is usable, and otherwise walks the user through the
//! three-legged authorization and caches the result.

pub mod authorizer;
pub mod callback;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod provider;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

pub use authorizer::{AuthorizationRequest, InteractiveAuthorizer, exchange_code};
pub use callback::CallbackListener;
pub use client::AuthenticatedClient;
pub use config::{
    AuthStrategy, CredentialOptions, OAUTH_CALLBACK_PORT, OAuthClientConfig, OOB_REDIRECT_URI,
    YOUTUBE_SCOPE,
};
pub use console::{Console, TerminalConsole};
pub use error::AuthError;
pub use provider::CredentialProvider;
pub use store::TokenStore;
pub use token::OAuthToken;
