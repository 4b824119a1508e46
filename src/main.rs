use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use yt_auth::{
    AuthStrategy, CredentialOptions, CredentialProvider, OAUTH_CALLBACK_PORT, OAuthClientConfig,
    TokenStore, YOUTUBE_SCOPE,
};

/// How the authorization code is collected from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Print the authorization URL and paste the code back (installed application clients)
    Prompt,
    /// Open the browser and receive the code on a local listener (web application clients)
    LocalCallback,
}

/// Add to YouTube - Authorizes this tool against the YouTube Data API and caches the credential
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the client_secrets.json file downloaded from the Google Cloud Console
    #[arg(long, default_value = "client_secrets.json")]
    client_secrets: PathBuf,

    /// Directory holding the cached credential (default: ~/.credentials)
    #[arg(long)]
    secrets_path: Option<PathBuf>,

    /// OAuth scope(s) to request, space separated
    #[arg(long, default_value = YOUTUBE_SCOPE)]
    scope: String,

    /// Fail instead of asking for authorization when no usable credential is cached
    #[arg(long)]
    skip_auth: bool,

    /// How to obtain the authorization code
    #[arg(long, value_enum, default_value_t = Strategy::Prompt)]
    strategy: Strategy,

    /// Port of the local callback listener (local-callback strategy only)
    #[arg(long, default_value_t = OAUTH_CALLBACK_PORT)]
    port: u16,

    /// Give up waiting for the browser callback after this many seconds (default: wait forever)
    #[arg(long)]
    callback_timeout_secs: Option<u64>,
}

impl Args {
    fn strategy(&self) -> AuthStrategy {
        match self.strategy {
            Strategy::Prompt => AuthStrategy::Prompt,
            Strategy::LocalCallback => AuthStrategy::LocalCallback { port: self.port },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let client_config = OAuthClientConfig::from_client_secrets_file(&args.client_secrets)?;
    let options = CredentialOptions {
        secrets_path: args.secrets_path.clone(),
        skip_interactive_auth: args.skip_auth,
        client_config: Some(client_config),
        strategy: args.strategy(),
        callback_timeout: args.callback_timeout_secs.map(Duration::from_secs),
    };

    let client = CredentialProvider::new()
        .get_client(&args.scope, &options)
        .await?;

    let token = client.token().await;
    let store = TokenStore::resolve(options.secrets_path.as_deref())?;
    info!("Credential cached at: {}", store.path().display());
    match token.expiry {
        Some(expiry) => info!("Access token valid until {}", expiry.to_rfc3339()),
        None => info!("Access token does not expire"),
    }
    if token.refresh_token.is_none() {
        info!("No refresh token issued; authorization is needed again once it expires");
    }

    Ok(())
}
