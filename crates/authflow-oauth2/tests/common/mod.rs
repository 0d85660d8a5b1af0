//! Common test utilities for integration tests
//!
//! Fakes for the injected capabilities (user agent, loopback receiver)
//! and wiremock scaffolding for the token and device endpoints.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authflow_oauth2::jose::base64url;
use authflow_oauth2::{CompletionMatcher, FlowError, LoopbackReceiver, Result, UserAgent};

/// Mock authorization server for token and device endpoints
pub struct MockAuthServer {
    pub server: MockServer,
    pub token_endpoint: String,
    pub device_endpoint: String,
}

impl MockAuthServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();

        Self {
            token_endpoint: format!("{base_url}/token"),
            device_endpoint: format!("{base_url}/device"),
            server,
        }
    }

    /// Mock a successful token response
    pub async fn mock_token_success(&self, access_token: &str, id_token: Option<&str>) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid profile",
        });
        if let Some(id_token) = id_token {
            body["id_token"] = json!(id_token);
        }

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a token endpoint OAuth error
    pub async fn mock_token_error(&self, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    /// Mock the device authorization endpoint
    pub async fn mock_device_authorization(&self) {
        Mock::given(method("POST"))
            .and(path("/device"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123",
                "user_code": "WDJB-MJHT",
                "verification_uri": format!("{}/activate", self.server.uri()),
                "expires_in": 900,
                "interval": 5,
            })))
            .mount(&self.server)
            .await;
    }
}

/// User agent that records the navigated URI and answers with a scripted
/// location
///
/// The literal `{state}` in the template is replaced with the `state`
/// query parameter of the navigated URI, so scripted redirects echo the
/// engine-generated state the way a real server would.
#[derive(Debug)]
pub struct ScriptedUserAgent {
    template: String,
    pub navigated: Mutex<Vec<String>>,
}

impl ScriptedUserAgent {
    pub fn returning(template: impl Into<String>) -> Self {
        Self { template: template.into(), navigated: Mutex::new(Vec::new()) }
    }

    /// The URI the engine asked this agent to open
    pub fn last_navigated(&self) -> String {
        self.navigated.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl UserAgent for ScriptedUserAgent {
    async fn navigate(&self, uri: &str, _completion: &CompletionMatcher) -> Result<String> {
        self.navigated.lock().unwrap().push(uri.to_string());
        let state = query_param(uri, "state").unwrap_or_default();
        Ok(self.template.replace("{state}", &state))
    }
}

/// Loopback receiver that answers with a canned POST body
#[derive(Debug)]
pub struct CannedReceiver {
    body: String,
}

impl CannedReceiver {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[async_trait]
impl LoopbackReceiver for CannedReceiver {
    async fn listen(&self, _uri_prefix: &str) -> Result<String> {
        Ok(self.body.clone())
    }
}

/// Loopback receiver that never hears a POST (simulated crash)
#[derive(Debug)]
pub struct PendingReceiver;

#[async_trait]
impl LoopbackReceiver for PendingReceiver {
    async fn listen(&self, _uri_prefix: &str) -> Result<String> {
        std::future::pending::<()>().await;
        Err(FlowError::Protocol { reason: "unreachable".into() })
    }
}

/// Extract a query parameter from a URI
pub fn query_param(uri: &str, name: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Hand-craft an unsigned id_token with the given nonce claim
pub fn id_token_with_nonce(nonce: &str) -> String {
    let header =
        base64url::encode(serde_json::to_vec(&json!({"alg": "none", "typ": "JWT"})).unwrap());
    let payload = base64url::encode(serde_json::to_vec(&json!({"nonce": nonce})).unwrap());
    format!("{header}.{payload}")
}
