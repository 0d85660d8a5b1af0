//! Token endpoint client
//!
//! Sends one grant per call - authorization code, client credentials,
//! device code, or refresh token - with the selected client
//! authentication method, and post-processes the response (id_token nonce
//! check, expiry annotation). No retries happen here; transport failures
//! propagate untouched.

use std::collections::HashMap;
use std::fmt;

use authflow_jose::{AssertionKey, DecodedJwt, build_client_assertion};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::authorize::AuthorizationResult;
use crate::error::{FlowError, Result};

/// The grant being exchanged; exactly one shape per request
#[derive(Debug, Clone)]
pub enum TokenGrant {
    /// Exchange an authorization code (with its PKCE verifier and the
    /// redirect URI the code was issued for)
    AuthorizationCode {
        /// The code from the authorization response
        code: String,
        /// PKCE verifier matching the challenge sent earlier
        code_verifier: Option<String>,
        /// The redirect URI repeated from the authorization request
        redirect_uri: Option<String>,
    },
    /// Server-to-server client credentials
    ClientCredentials,
    /// Second leg of the device code flow
    DeviceCode {
        /// The device code from the device authorization response
        device_code: String,
    },
    /// Refresh an access token
    RefreshToken {
        /// The current refresh token
        refresh_token: String,
    },
}

impl TokenGrant {
    /// The wire `grant_type` value
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode { .. } => "urn:ietf:params:oauth:grant-type:device_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// How the client authenticates at the token endpoint
#[derive(Clone)]
pub enum ClientAuth {
    /// Public client: no authentication beyond `client_id`
    None,
    /// `client_secret_basic`: HTTP Basic with `client_id:client_secret`
    SecretBasic(SecretString),
    /// `client_secret_post`: the secret travels in the form body
    SecretPost(SecretString),
    /// `client_secret_jwt`: HMAC-signed jwt-bearer assertion
    SecretJwt(SecretString),
    /// `private_key_jwt`: key-signed jwt-bearer assertion
    PrivateKeyJwt(AssertionKey),
}

// Manual Debug: secrets and private keys must not reach logs
impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "ClientAuth::None",
            Self::SecretBasic(_) => "ClientAuth::SecretBasic(..)",
            Self::SecretPost(_) => "ClientAuth::SecretPost(..)",
            Self::SecretJwt(_) => "ClientAuth::SecretJwt(..)",
            Self::PrivateKeyJwt(_) => "ClientAuth::PrivateKeyJwt(..)",
        })
    }
}

impl ClientAuth {
    fn method_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SecretBasic(_) => "client_secret_basic",
            Self::SecretPost(_) => "client_secret_post",
            Self::SecretJwt(_) => "client_secret_jwt",
            Self::PrivateKeyJwt(_) => "private_key_jwt",
        }
    }
}

/// One token endpoint request
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// The token endpoint URL
    pub token_endpoint: String,
    /// The client identifier
    pub client_id: String,
    /// The grant to exchange
    pub grant: TokenGrant,
    /// Client authentication method
    pub client_auth: ClientAuth,
    /// Requested scope
    pub scope: Option<String>,
    /// When set and the response carries an `id_token`, its `nonce` claim
    /// must equal this value
    pub expected_nonce: Option<String>,
    /// Custom headers; these extend or override the defaults, including
    /// Content-Type
    pub headers: Vec<(String, String)>,
}

impl TokenRequest {
    /// Start a request for the given endpoint, client, and grant
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        grant: TokenGrant,
    ) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            grant,
            client_auth: ClientAuth::None,
            scope: None,
            expected_nonce: None,
            headers: Vec::new(),
        }
    }

    /// Build the code-exchange request for a validated authorization
    /// result
    ///
    /// Carries over the client id, code, PKCE verifier, redirect URI, and
    /// nonce the result was produced with.
    ///
    /// # Errors
    /// [`FlowError::Protocol`] when the result holds no authorization
    /// code.
    pub fn from_authorization(
        token_endpoint: impl Into<String>,
        result: &AuthorizationResult,
    ) -> Result<Self> {
        let code = result
            .code
            .clone()
            .ok_or_else(|| FlowError::protocol("authorization result carries no code"))?;

        let mut request = Self::new(
            token_endpoint,
            result.client_id.clone(),
            TokenGrant::AuthorizationCode {
                code,
                code_verifier: result.code_verifier.clone(),
                redirect_uri: result.redirect_uri.clone(),
            },
        );
        request.expected_nonce = result.nonce.clone();
        Ok(request)
    }

    /// Set the client authentication method
    #[must_use]
    pub fn with_client_auth(mut self, auth: ClientAuth) -> Self {
        self.client_auth = auth;
        self
    }

    /// Set the scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Require the response id_token to carry this nonce
    #[must_use]
    pub fn with_expected_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.expected_nonce = Some(nonce.into());
        self
    }

    /// Add a custom header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Whatever the token endpoint returned, plus a derived absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Token type, typically `Bearer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Refresh token, when the server issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, for OIDC grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope, when it differs from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Absolute expiry derived from `expires_in` when the response was
    /// received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Any additional fields the server returned
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Client for the token endpoint
#[derive(Debug, Clone)]
pub struct TokenClient {
    http_client: reqwest::Client,
}

impl Default for TokenClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenClient {
    /// Create a client with a default HTTP client (10s timeout)
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create a client around an existing HTTP client
    #[must_use]
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Send one token request and post-process the response
    ///
    /// # Errors
    /// [`FlowError::Http`] for transport failures (propagated untouched),
    /// [`FlowError::Authorization`] when the server answers with an OAuth
    /// error document, [`FlowError::NonceMismatch`] when a returned
    /// id_token does not carry the expected nonce.
    pub async fn request_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", request.grant.grant_type().to_string()),
            ("client_id", request.client_id.clone()),
        ];

        match &request.grant {
            TokenGrant::AuthorizationCode { code, code_verifier, redirect_uri } => {
                form.push(("code", code.clone()));
                if let Some(redirect_uri) = redirect_uri {
                    form.push(("redirect_uri", redirect_uri.clone()));
                }
                if let Some(code_verifier) = code_verifier {
                    form.push(("code_verifier", code_verifier.clone()));
                }
            }
            TokenGrant::ClientCredentials => {}
            TokenGrant::DeviceCode { device_code } => {
                form.push(("device_code", device_code.clone()));
            }
            TokenGrant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.clone()));
            }
        }

        if let Some(scope) = &request.scope {
            form.push(("scope", scope.clone()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        match &request.client_auth {
            ClientAuth::None => {}
            ClientAuth::SecretBasic(secret) => {
                headers.insert(AUTHORIZATION, basic_credentials(&request.client_id, secret)?);
            }
            ClientAuth::SecretPost(secret) => {
                form.push(("client_secret", secret.expose_secret().clone()));
            }
            ClientAuth::SecretJwt(secret) => {
                let key = AssertionKey::SharedSecret(secret.clone());
                push_assertion(&mut form, request, &key)?;
            }
            ClientAuth::PrivateKeyJwt(key) => {
                push_assertion(&mut form, request, key)?;
            }
        }

        // Caller headers win, including Content-Type overrides
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FlowError::protocol(format!("invalid header name `{name}`")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FlowError::protocol("invalid header value"))?;
            headers.insert(name, value);
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &form {
            serializer.append_pair(name, value);
        }
        let body = serializer.finish();

        debug!(
            token_endpoint = %request.token_endpoint,
            grant_type = request.grant.grant_type(),
            client_auth = request.client_auth.method_name(),
            "requesting token"
        );

        let response = self
            .http_client
            .post(&request.token_endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(oauth_error_from_body(status, &body));
        }

        let mut token: TokenResponse = response.json().await?;
        if let Some(expires_in) = token.expires_in {
            token.expires_at = Some(Utc::now() + chrono::Duration::seconds(expires_in as i64));
        }

        if let (Some(expected), Some(id_token)) =
            (request.expected_nonce.as_deref(), token.id_token.as_deref())
        {
            let decoded = DecodedJwt::decode(id_token)?;
            let received = decoded.claim_str("nonce").unwrap_or_default().to_string();
            if received != expected {
                return Err(FlowError::NonceMismatch {
                    expected: expected.to_string(),
                    received,
                });
            }
        }

        debug!(
            token_endpoint = %request.token_endpoint,
            grant_type = request.grant.grant_type(),
            "token response received"
        );
        Ok(token)
    }
}

/// `Authorization: Basic` credentials from the UTF-8 `client_id:secret`
/// pair
fn basic_credentials(client_id: &str, secret: &SecretString) -> Result<HeaderValue> {
    let credential = STANDARD.encode(format!("{client_id}:{}", secret.expose_secret()));
    let mut value = HeaderValue::from_str(&format!("Basic {credential}"))
        .map_err(|_| FlowError::protocol("client credentials are not header-safe"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Build a client assertion and add it to the form body
fn push_assertion(
    form: &mut Vec<(&str, String)>,
    request: &TokenRequest,
    key: &AssertionKey,
) -> Result<()> {
    let assertion = build_client_assertion(
        &request.client_id,
        &request.token_endpoint,
        key,
        None,
        &serde_json::Map::new(),
    )?;
    form.push(("client_assertion", assertion.jwt));
    form.push(("client_assertion_type", assertion.assertion_type.to_string()));
    Ok(())
}

/// Interpret a non-success token endpoint body
///
/// An OAuth error document becomes a structured
/// [`FlowError::Authorization`]; anything else is a protocol error
/// carrying the status.
pub(crate) fn oauth_error_from_body(status: reqwest::StatusCode, body: &str) -> FlowError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        error_description: Option<String>,
        error_uri: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => FlowError::Authorization {
            error: parsed.error,
            error_description: parsed.error_description,
            error_uri: parsed.error_uri,
        },
        Err(_) => FlowError::protocol(format!("token endpoint returned HTTP {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_strings() {
        assert_eq!(
            TokenGrant::AuthorizationCode {
                code: "c".into(),
                code_verifier: None,
                redirect_uri: None
            }
            .grant_type(),
            "authorization_code"
        );
        assert_eq!(TokenGrant::ClientCredentials.grant_type(), "client_credentials");
        assert_eq!(
            TokenGrant::DeviceCode { device_code: "d".into() }.grant_type(),
            "urn:ietf:params:oauth:grant-type:device_code"
        );
        assert_eq!(
            TokenGrant::RefreshToken { refresh_token: "r".into() }.grant_type(),
            "refresh_token"
        );
    }

    #[test]
    fn basic_credentials_encode_utf8_pair() {
        let secret = SecretString::new("s3cr3t".into());
        let value = basic_credentials("client-1", &secret).unwrap();
        let expected = format!("Basic {}", STANDARD.encode("client-1:s3cr3t"));
        assert_eq!(value.to_str().unwrap(), expected);
    }

    #[test]
    fn client_auth_debug_is_redacted() {
        let auth = ClientAuth::SecretBasic(SecretString::new("hunter2".into()));
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn from_authorization_requires_a_code() {
        let result = AuthorizationResult {
            code: None,
            access_token: Some("tok".into()),
            id_token: None,
            nonce: None,
            client_id: "client-1".into(),
            code_verifier: None,
            redirect_uri: None,
            expires_in: None,
            expires_at: None,
            extra: HashMap::new(),
        };
        let err = TokenRequest::from_authorization("https://as/token", &result).unwrap_err();
        assert!(matches!(err, FlowError::Protocol { .. }));
    }

    #[test]
    fn from_authorization_carries_exchange_material() {
        let result = AuthorizationResult {
            code: Some("abc".into()),
            access_token: None,
            id_token: None,
            nonce: Some("n0nce".into()),
            client_id: "client-1".into(),
            code_verifier: Some("verifier".into()),
            redirect_uri: Some("http://cb".into()),
            expires_in: None,
            expires_at: None,
            extra: HashMap::new(),
        };
        let request = TokenRequest::from_authorization("https://as/token", &result).unwrap();

        assert_eq!(request.client_id, "client-1");
        assert_eq!(request.expected_nonce.as_deref(), Some("n0nce"));
        match request.grant {
            TokenGrant::AuthorizationCode { code, code_verifier, redirect_uri } => {
                assert_eq!(code, "abc");
                assert_eq!(code_verifier.as_deref(), Some("verifier"));
                assert_eq!(redirect_uri.as_deref(), Some("http://cb"));
            }
            other => panic!("expected a code grant, got {other:?}"),
        }
    }

    #[test]
    fn error_body_parsing() {
        let err = oauth_error_from_body(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": "invalid_grant", "error_description": "expired"}"#,
        );
        match err {
            FlowError::Authorization { error, error_description, .. } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(error_description.as_deref(), Some("expired"));
            }
            other => panic!("expected Authorization, got {other:?}"),
        }

        let err = oauth_error_from_body(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(err, FlowError::Protocol { .. }));
    }

    #[test]
    fn token_response_parses_and_flattens_extras() {
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 3600,
                "ext_expires_in": 7200
            }"#,
        )
        .unwrap();

        assert_eq!(token.access_token.as_deref(), Some("tok"));
        assert_eq!(token.expires_in, Some(3600));
        assert!(token.expires_at.is_none()); // annotated only after a live response
        assert_eq!(token.extra["ext_expires_in"], 7200);
    }
}
