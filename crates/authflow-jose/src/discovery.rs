//! OIDC provider discovery
//!
//! Fetches the `.well-known/openid-configuration` document for an issuer.
//! The verifier uses it to locate the `jwks_uri`; the flow layer can use it
//! to wire endpoints into a client configuration instead of hardcoding
//! them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{JoseError, Result};

/// Provider metadata from the discovery document
///
/// Only the commonly consumed fields are modeled; everything else the
/// provider publishes is ignored on parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// The provider's issuer identifier
    pub issuer: String,

    /// URL of the authorization endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// URL of the device authorization endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,

    /// URL of the provider's JWK Set document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// URL of the userinfo endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// URL of the end-session endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// Supported response types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// Supported response modes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modes_supported: Option<Vec<String>>,

    /// Supported grant types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Supported scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported client authentication methods at the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// Supported ID token signing algorithms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

/// Normalize an issuer identifier for discovery
///
/// Defaults the scheme to `https` and trims any trailing slash so the
/// well-known path concatenates cleanly.
#[must_use]
pub fn normalize_issuer(issuer: &str) -> String {
    let trimmed = issuer.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Fetch the provider metadata for an issuer
///
/// # Errors
/// [`JoseError::Http`] on transport or parse failure,
/// [`JoseError::KeyResolution`] when the endpoint answers with a
/// non-success status.
pub async fn fetch_provider_metadata(issuer: &str) -> Result<ProviderMetadata> {
    let issuer = normalize_issuer(issuer);
    let discovery_url = format!("{issuer}/.well-known/openid-configuration");

    debug!(issuer = %issuer, discovery_url = %discovery_url, "Fetching provider metadata");

    let response = reqwest::get(&discovery_url).await?;
    if !response.status().is_success() {
        return Err(JoseError::key_resolution(format!(
            "discovery endpoint returned status {}",
            response.status()
        )));
    }

    Ok(response.json::<ProviderMetadata>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_scheme_and_trims_slash() {
        assert_eq!(
            normalize_issuer("login.example.com/tenant/"),
            "https://login.example.com/tenant"
        );
        assert_eq!(
            normalize_issuer("https://as.example.com"),
            "https://as.example.com"
        );
        assert_eq!(
            normalize_issuer("http://127.0.0.1:8080/"),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn metadata_parses_minimal_document() {
        let metadata: ProviderMetadata = serde_json::from_str(
            r#"{"issuer": "https://as.example.com", "jwks_uri": "https://as.example.com/jwks"}"#,
        )
        .unwrap();
        assert_eq!(metadata.issuer, "https://as.example.com");
        assert_eq!(
            metadata.jwks_uri.as_deref(),
            Some("https://as.example.com/jwks")
        );
        assert!(metadata.token_endpoint.is_none());
    }
}
