//! Local listener receiving the authorization code from the browser redirect.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AuthError;

#[derive(Debug)]
enum CallbackOutcome {
    Code(String),
    Denied(String),
    StateMismatch,
}

/// Shared with the handler: where the outcome goes and what state to accept
struct CallbackState {
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
    expected_state: String,
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// A running callback listener.
///
/// The listener accepts a single callback and is shut down once
/// [`CallbackListener::wait_for_code`] returns or the value is dropped.
pub struct CallbackListener {
    port: u16,
    code_rx: oneshot::Receiver<CallbackOutcome>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>` and start answering callbacks.
    ///
    /// Only a callback echoing `expected_state` is accepted; any other state
    /// is answered with `400` and fails the wait.
    pub async fn bind(port: u16, expected_state: String) -> Result<Self, AuthError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| AuthError::Listen { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| AuthError::Listen { port, source })?
            .port();

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/", get(handle_callback))
            .with_state(Arc::new(CallbackState {
                sender: Mutex::new(Some(code_tx)),
                expected_state,
            }));

        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("OAuth callback listener failed: {}", e);
            }
        });

        debug!(port, "OAuth callback listener started");

        Ok(Self {
            port,
            code_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI pointing at this listener
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Wait for the callback and return its code, then stop the listener
    pub async fn wait_for_code(mut self, timeout: Option<Duration>) -> Result<String, AuthError> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.code_rx)
                .await
                .map_err(|_| AuthError::CallbackTimeout(limit)),
            None => Ok((&mut self.code_rx).await),
        };

        self.shutdown().await;

        let outcome = received?.map_err(|_| {
            AuthError::Callback("listener stopped before a code arrived".to_string())
        })?;

        match outcome {
            CallbackOutcome::Code(code) => Ok(code),
            CallbackOutcome::Denied(error) => Err(AuthError::Callback(error)),
            CallbackOutcome::StateMismatch => {
                Err(AuthError::Callback("state parameter mismatch".to_string()))
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
        debug!(port = self.port, "OAuth callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_callback(
    State(shared): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (outcome, status, body) = match (params.code, params.error) {
        (Some(_), _) if params.state.as_deref() != Some(shared.expected_state.as_str()) => {
            warn!("OAuth callback carried an unexpected state parameter");
            (
                CallbackOutcome::StateMismatch,
                StatusCode::BAD_REQUEST,
                "State mismatch".to_string(),
            )
        }
        (Some(code), _) if !code.is_empty() => {
            let body = format!(
                "Received code: {}\r\nYou can now safely close this browser window.",
                code
            );
            (CallbackOutcome::Code(code), StatusCode::OK, body)
        }
        (_, Some(error)) => {
            let body = format!(
                "Authorization failed: {}\r\nYou can now safely close this browser window.",
                error
            );
            (CallbackOutcome::Denied(error), StatusCode::OK, body)
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                "Missing authorization code",
            )
                .into_response();
        }
    };

    if let Some(tx) = shared.sender.lock().await.take() {
        let _ = tx.send(outcome);
    }

    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
