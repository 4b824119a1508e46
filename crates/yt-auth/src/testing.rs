//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::OAuthClientConfig;
use crate::console::Console;

pub(crate) fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Token endpoint accepting `code` and rejecting anything else with `invalid_grant`
pub(crate) async fn token_endpoint(code: &str, access_token: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(format!("code={}", code)))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "expires_in": 3599,
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/youtube",
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Malformed auth code."
        })))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

pub(crate) fn mock_config(server: &MockServer) -> OAuthClientConfig {
    let mut config = OAuthClientConfig::new("test-client", "test-secret");
    config.token_uri = format!("{}/token", server.uri());
    config
}

/// Decoded value of query parameter `name` in `url`
pub(crate) fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != name {
            return None;
        }
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

/// Console answering prompts from a script and recording what it was asked to do
#[derive(Default)]
pub(crate) struct ScriptedConsole {
    lines: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    opened: Mutex<Vec<String>>,
    browser_fails: bool,
    callback_code: Option<String>,
}

impl ScriptedConsole {
    pub(crate) fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Console whose "browser" follows the redirect with `code`
    pub(crate) fn answering_callback(code: &str) -> Self {
        Self {
            callback_code: Some(code.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn without_browser() -> Self {
        Self {
            browser_fails: true,
            ..Self::default()
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn prompt_line(&self, message: &str) -> std::io::Result<String> {
        self.prompts.lock().unwrap().push(message.to_string());
        self.lines
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
    }

    fn show(&self, _message: &str) {}

    fn open_browser(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.browser_fails {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "no browser available",
            ));
        }

        if let Some(code) = &self.callback_code {
            let redirect = query_param(url, "redirect_uri").unwrap();
            let state = query_param(url, "state").unwrap();
            let callback = format!("{}/?code={}&state={}", redirect, code, state);
            tokio::spawn(async move {
                http().get(callback).send().await.unwrap();
            });
        }
        Ok(())
    }
}
