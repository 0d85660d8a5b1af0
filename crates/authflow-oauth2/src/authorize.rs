//! Authorization endpoint orchestration
//!
//! Builds the authorization request (state, nonce, PKCE, response mode),
//! hands the URI to the injected [`UserAgent`], parses the redirect (or
//! the `form_post` body captured by the [`LoopbackReceiver`]), and
//! enforces the state and nonce invariants before anything reaches the
//! caller.
//!
//! The call moves through building, awaiting user interaction, parsing,
//! and validation; the caller sees one blocking operation. Only the
//! `form_post` path spawns a helper task, and that task is always joined
//! or aborted before the call returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use authflow_jose::DecodedJwt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::{CompletionMatcher, LoopbackReceiver, UserAgent};
use crate::config::ClientConfig;
use crate::error::{FlowError, Result};
use crate::pkce::{PkceChallenge, generate_nonce, generate_state};

/// How long the loopback receiver may take after the interactive step
const RECEIVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Startup grace before launching interaction, so the receiver is
/// listening when the server's POST arrives
const RECEIVER_STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Parameter names the engine owns; caller-supplied values for these are
/// lifted out of the custom parameters instead of being appended
const RESERVED_PARAMETERS: [&str; 5] =
    ["state", "nonce", "code_challenge", "code_challenge_method", "code_verifier"];

/// How the server returns the authorization response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Parameters in the redirect query string
    Query,
    /// Parameters in the redirect fragment
    Fragment,
    /// Parameters POSTed to the redirect URI
    FormPost,
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
        })
    }
}

/// Which protocol a request speaks, derived from its response type and
/// scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain OAuth 2.0
    OAuth,
    /// OpenID Connect (nonce required, `openid` scope enforced)
    Oidc,
}

/// An authorization request before the engine fills in state, nonce, and
/// PKCE
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// The authorization endpoint URL
    pub authorization_endpoint: String,
    /// The client identifier
    pub client_id: String,
    /// `code`, `token`, `id_token`, `none`, or a space-joined combination
    pub response_type: String,
    /// Where the server should send the response
    pub redirect_uri: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// Response mode override; only `form_post` changes the wire request
    pub response_mode: Option<ResponseMode>,
    /// Extra query parameters, appended in order. The reserved names
    /// `state`, `nonce`, `code_challenge`, `code_challenge_method`, and
    /// `code_verifier` seed the engine's own values instead.
    pub custom_parameters: Vec<(String, String)>,
    /// Whether to attach a PKCE challenge to code requests
    pub use_pkce: bool,
}

impl AuthorizationRequest {
    /// Start a request for the given endpoint, client, and response type
    pub fn new(
        authorization_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            client_id: client_id.into(),
            response_type: response_type.into(),
            redirect_uri: None,
            scope: None,
            response_mode: None,
            custom_parameters: Vec::new(),
            use_pkce: true,
        }
    }

    /// Build a request from a client configuration
    pub fn from_config(config: &ClientConfig, response_type: impl Into<String>) -> Self {
        let mut request = Self::new(
            config.authorization_endpoint.clone(),
            config.client_id.clone(),
            response_type,
        );
        request.redirect_uri = config.redirect_uri.clone();
        request.scope = config.scope.clone();
        request.use_pkce = config.use_pkce;
        request
    }

    /// Set the redirect URI
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the response mode
    #[must_use]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = Some(mode);
        self
    }

    /// Append a custom parameter (reserved names seed the engine's own
    /// values)
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.push((name.into(), value.into()));
        self
    }

    /// Disable PKCE for this request
    #[must_use]
    pub fn without_pkce(mut self) -> Self {
        self.use_pkce = false;
        self
    }
}

/// The validated outcome of an authorization request
///
/// For code grants this carries everything the token exchange needs
/// (`client_id`, `code_verifier`, `redirect_uri`). The CSRF `state` is
/// validated internally and deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResult {
    /// Authorization code, when the grant produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Access token, for implicit and hybrid grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// ID token, for OIDC implicit and hybrid grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// The request nonce, echoed for the token exchange's id_token check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// The client the grant belongs to
    pub client_id: String,

    /// PKCE verifier to present at the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,

    /// Redirect URI to repeat at the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Token lifetime in seconds, when the server sent one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Absolute expiry derived from `expires_in` at parse time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Remaining response parameters (`token_type`, `scope`, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// Conducts authorization requests through the injected capabilities
#[derive(Debug, Clone)]
pub struct AuthorizationClient {
    user_agent: Arc<dyn UserAgent>,
    loopback: Option<Arc<dyn LoopbackReceiver>>,
}

impl AuthorizationClient {
    /// Create a client around an interactive user agent
    pub fn new(user_agent: Arc<dyn UserAgent>) -> Self {
        Self { user_agent, loopback: None }
    }

    /// Attach a loopback receiver, enabling `form_post` requests
    #[must_use]
    pub fn with_loopback_receiver(mut self, receiver: Arc<dyn LoopbackReceiver>) -> Self {
        self.loopback = Some(receiver);
        self
    }

    /// Conduct one authorization request to completion
    ///
    /// # Errors
    /// [`FlowError::Authorization`] when the server reports an error,
    /// [`FlowError::StateMismatch`]/[`FlowError::NonceMismatch`] on a
    /// violated security invariant, [`FlowError::Timeout`] when the
    /// `form_post` receiver never hears back, [`FlowError::Protocol`] when
    /// the response matches no expected shape.
    pub async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationResult> {
        let prepared = PreparedRequest::assemble(request);
        debug!(
            client_id = %prepared.client_id,
            protocol = ?prepared.protocol,
            response_type = %prepared.response_type,
            "authorization request assembled"
        );

        let (query, fragment) = self.dispatch(&prepared).await?;

        debug!(client_id = %prepared.client_id, "parsing authorization response");
        let parsed = parse_response(&prepared, &query, &fragment)?;

        let result = validate(&prepared, parsed)?;
        debug!(client_id = %prepared.client_id, "authorization response validated");
        Ok(result)
    }

    /// Run the interactive step, and for `form_post` the receiver task
    /// around it
    async fn dispatch(&self, prepared: &PreparedRequest) -> Result<(String, String)> {
        let matcher = match &prepared.redirect_uri {
            Some(redirect_uri) => CompletionMatcher::for_redirect(redirect_uri.clone()),
            None => CompletionMatcher::any_callback(),
        };

        if prepared.response_mode == Some(ResponseMode::FormPost) {
            let receiver = self.loopback.clone().ok_or_else(|| {
                FlowError::protocol("response_mode=form_post requires a loopback receiver")
            })?;
            let prefix = prepared.redirect_uri.clone().ok_or_else(|| {
                FlowError::protocol("response_mode=form_post requires a redirect_uri")
            })?;

            // The receiver must be listening before the server can POST
            // back to it
            let mut listener = tokio::spawn(async move { receiver.listen(&prefix).await });
            tokio::time::sleep(RECEIVER_STARTUP_GRACE).await;

            debug!(mode = "form_post", "awaiting user interaction");
            if let Err(e) = self.user_agent.navigate(&prepared.uri, &matcher).await {
                listener.abort();
                return Err(e);
            }

            match tokio::time::timeout(RECEIVER_TIMEOUT, &mut listener).await {
                Ok(Ok(Ok(body))) => Ok((body, String::new())),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(join_error)) => Err(FlowError::protocol(format!(
                    "loopback receiver task failed: {join_error}"
                ))),
                Err(_) => {
                    listener.abort();
                    Err(FlowError::Timeout { seconds: RECEIVER_TIMEOUT.as_secs() })
                }
            }
        } else {
            debug!("awaiting user interaction");
            let location = self.user_agent.navigate(&prepared.uri, &matcher).await?;
            Ok(split_location(&location))
        }
    }
}

/// A request with state, nonce, and PKCE established and the URI
/// assembled
#[derive(Debug)]
struct PreparedRequest {
    uri: String,
    client_id: String,
    response_type: String,
    protocol: Protocol,
    state: String,
    nonce: Option<String>,
    code_verifier: Option<String>,
    redirect_uri: Option<String>,
    response_mode: Option<ResponseMode>,
}

impl PreparedRequest {
    fn assemble(request: AuthorizationRequest) -> Self {
        let mut custom = request.custom_parameters;
        let caller_state = take_parameter(&mut custom, "state");
        let caller_nonce = take_parameter(&mut custom, "nonce");
        let caller_challenge = take_parameter(&mut custom, "code_challenge");
        let caller_challenge_method = take_parameter(&mut custom, "code_challenge_method");
        let caller_verifier = take_parameter(&mut custom, "code_verifier");

        let mut scope = request.scope;
        let protocol = detect_protocol(&request.response_type, scope.as_deref());

        if protocol == Protocol::Oidc && !scope_contains(scope.as_deref(), "openid") {
            warn!("OIDC request without openid scope; appending it");
            scope = Some(match scope {
                Some(existing) => format!("{existing} openid"),
                None => "openid".to_string(),
            });
        }

        let state = caller_state.unwrap_or_else(generate_state);
        let nonce = match protocol {
            Protocol::Oidc => Some(caller_nonce.unwrap_or_else(generate_nonce)),
            Protocol::OAuth => caller_nonce,
        };

        let wants_code = request.response_type.split_whitespace().any(|t| t == "code");
        let (challenge, challenge_method, code_verifier) = if wants_code && request.use_pkce {
            if let Some(challenge) = caller_challenge {
                let method = caller_challenge_method.unwrap_or_else(|| "S256".to_string());
                (Some(challenge), Some(method), caller_verifier)
            } else if let Some(verifier) = caller_verifier {
                (
                    Some(PkceChallenge::compute_challenge(&verifier)),
                    Some("S256".to_string()),
                    Some(verifier),
                )
            } else {
                let pkce = PkceChallenge::generate();
                (
                    Some(pkce.code_challenge),
                    Some(pkce.code_challenge_method.to_string()),
                    Some(pkce.code_verifier),
                )
            }
        } else {
            (None, None, None)
        };

        // Parameter order is part of the wire contract some servers have
        // grown to depend on
        let mut pairs: Vec<(String, String)> = vec![
            ("response_type".into(), request.response_type.clone()),
            ("client_id".into(), request.client_id.clone()),
            ("state".into(), state.clone()),
        ];
        if let Some(redirect_uri) = &request.redirect_uri {
            pairs.push(("redirect_uri".into(), redirect_uri.clone()));
        }
        if let Some(scope) = &scope {
            pairs.push(("scope".into(), scope.clone()));
        }
        if let Some(nonce) = &nonce {
            pairs.push(("nonce".into(), nonce.clone()));
        }
        if let (Some(challenge), Some(method)) = (&challenge, &challenge_method) {
            pairs.push(("code_challenge".into(), challenge.clone()));
            pairs.push(("code_challenge_method".into(), method.clone()));
        }
        pairs.extend(custom);
        if request.response_mode == Some(ResponseMode::FormPost) {
            pairs.push(("response_mode".into(), "form_post".into()));
        }

        let query: Vec<String> = pairs
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect();
        let query = query.join("&");

        let separator = if request.authorization_endpoint.contains('?') { '&' } else { '?' };
        let uri = format!("{}{separator}{query}", request.authorization_endpoint);

        Self {
            uri,
            client_id: request.client_id,
            response_type: request.response_type,
            protocol,
            state,
            nonce,
            code_verifier,
            redirect_uri: request.redirect_uri,
            response_mode: request.response_mode,
        }
    }
}

/// OIDC iff the response type asks for an id_token, or it is a plain code
/// request with the openid scope
fn detect_protocol(response_type: &str, scope: Option<&str>) -> Protocol {
    let has_id_token = response_type.split_whitespace().any(|t| t == "id_token");
    let code_only = response_type.trim() == "code";
    if has_id_token || (code_only && scope_contains(scope, "openid")) {
        Protocol::Oidc
    } else {
        Protocol::OAuth
    }
}

fn scope_contains(scope: Option<&str>, token: &str) -> bool {
    scope.is_some_and(|s| s.split_whitespace().any(|t| t == token))
}

/// Remove the first occurrence of a named custom parameter
fn take_parameter(parameters: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let index = parameters.iter().position(|(key, _)| key == name)?;
    Some(parameters.remove(index).1)
}

/// Split a final location into its query and fragment parts
fn split_location(location: &str) -> (String, String) {
    let (without_fragment, fragment) = match location.split_once('#') {
        Some((head, fragment)) => (head, fragment),
        None => (location, ""),
    };
    let query = without_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or("");
    (query.to_string(), fragment.to_string())
}

/// Decode `&`/`#`-delimited key=value pairs, URL-decoding each value
fn parse_pairs(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.replace('#', "&").as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn lookup(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.clone())
}

/// The response parameters extracted before validation
#[derive(Debug)]
struct ParsedResponse {
    code: Option<String>,
    state: Option<String>,
    access_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<u64>,
    extra: HashMap<String, String>,
}

/// Case analysis over the redirect, in priority order: query code, query
/// error, fragment token-or-error, nothing recognizable
fn parse_response(
    prepared: &PreparedRequest,
    query: &str,
    fragment: &str,
) -> Result<ParsedResponse> {
    let query_pairs = parse_pairs(query);

    if lookup(&query_pairs, "code").is_some() {
        let mut response = extract(query_pairs);
        if prepared.protocol == Protocol::OAuth {
            // Tokens in the query are an OIDC hybrid artifact; plain OAuth
            // code responses do not carry them
            response.access_token = None;
            response.id_token = None;
        }
        return Ok(response);
    }

    if let Some(error) = lookup(&query_pairs, "error") {
        return Err(FlowError::Authorization {
            error,
            error_description: lookup(&query_pairs, "error_description"),
            error_uri: lookup(&query_pairs, "error_uri"),
        });
    }

    if fragment.contains("token") || fragment.contains("error=") {
        let fragment_pairs = parse_pairs(fragment);
        if let Some(error) = lookup(&fragment_pairs, "error") {
            // state is excluded from the error payload
            return Err(FlowError::Authorization {
                error,
                error_description: lookup(&fragment_pairs, "error_description"),
                error_uri: lookup(&fragment_pairs, "error_uri"),
            });
        }
        return Ok(extract(fragment_pairs));
    }

    Err(FlowError::protocol("invalid response received"))
}

/// Pull the known response fields out of a pair list, keeping the rest
fn extract(pairs: Vec<(String, String)>) -> ParsedResponse {
    let mut response = ParsedResponse {
        code: None,
        state: None,
        access_token: None,
        id_token: None,
        expires_in: None,
        extra: HashMap::new(),
    };

    for (key, value) in pairs {
        match key.as_str() {
            "code" => response.code = Some(value),
            "state" => response.state = Some(value),
            "access_token" => response.access_token = Some(value),
            "id_token" => response.id_token = Some(value),
            "expires_in" => response.expires_in = value.parse().ok(),
            _ => {
                response.extra.insert(key, value);
            }
        }
    }

    response
}

/// Enforce the state and nonce invariants and build the caller-facing
/// result
fn validate(prepared: &PreparedRequest, parsed: ParsedResponse) -> Result<AuthorizationResult> {
    if parsed.state.as_deref() != Some(prepared.state.as_str()) {
        return Err(FlowError::StateMismatch {
            expected: prepared.state.clone(),
            received: parsed.state.unwrap_or_default(),
        });
    }

    if prepared.protocol == Protocol::Oidc
        && let Some(id_token) = &parsed.id_token
    {
        let decoded = DecodedJwt::decode(id_token)?;
        let received = decoded.claim_str("nonce").unwrap_or_default().to_string();
        let expected = prepared.nonce.clone().unwrap_or_default();
        if received != expected {
            return Err(FlowError::NonceMismatch { expected, received });
        }
    }

    let expires_at = parsed
        .expires_in
        .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds as i64));

    let has_code = parsed.code.is_some();
    Ok(AuthorizationResult {
        code: parsed.code,
        access_token: parsed.access_token,
        id_token: parsed.id_token,
        nonce: match prepared.protocol {
            Protocol::Oidc => prepared.nonce.clone(),
            Protocol::OAuth => None,
        },
        client_id: prepared.client_id.clone(),
        code_verifier: if has_code { prepared.code_verifier.clone() } else { None },
        redirect_uri: prepared.redirect_uri.clone(),
        expires_in: parsed.expires_in,
        expires_at,
        extra: parsed.extra,
    })
}
