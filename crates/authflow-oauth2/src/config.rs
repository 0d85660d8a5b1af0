//! Client configuration
//!
//! A serde-friendly bundle of everything one registered client needs:
//! endpoints, redirect URI, scope, and an optional secret. Endpoints can
//! be filled from discovery metadata instead of being hardcoded.

use authflow_jose::ProviderMetadata;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Configuration for one registered client against one authorization
/// server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The client identifier
    pub client_id: String,

    /// URL of the authorization endpoint
    pub authorization_endpoint: String,

    /// URL of the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// URL of the device authorization endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,

    /// Redirect URI registered for this client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Default scope for authorization requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client secret, when the client is confidential
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub client_secret: Option<SecretString>,

    /// User-Agent string the interactive agent should present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Whether code requests attach a PKCE challenge
    #[serde(default = "default_use_pkce")]
    pub use_pkce: bool,
}

fn default_use_pkce() -> bool {
    true
}

// Custom serialization for Option<SecretString>
fn serialize_secret<S>(
    secret: &Option<SecretString>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

// Custom deserialization for Option<SecretString>
fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.map(SecretString::new))
}

impl ClientConfig {
    /// Start a configuration with just a client id and authorization
    /// endpoint
    pub fn new(client_id: impl Into<String>, authorization_endpoint: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: None,
            device_authorization_endpoint: None,
            redirect_uri: None,
            scope: None,
            client_secret: None,
            user_agent: None,
            use_pkce: true,
        }
    }

    /// Wire a configuration from discovered provider metadata
    ///
    /// # Errors
    /// [`FlowError::Protocol`] when the metadata has no authorization
    /// endpoint.
    pub fn from_provider_metadata(
        metadata: &ProviderMetadata,
        client_id: impl Into<String>,
    ) -> Result<Self> {
        let authorization_endpoint = metadata.authorization_endpoint.clone().ok_or_else(|| {
            FlowError::protocol("provider metadata has no authorization_endpoint")
        })?;

        let mut config = Self::new(client_id, authorization_endpoint);
        config.token_endpoint = metadata.token_endpoint.clone();
        config.device_authorization_endpoint = metadata.device_authorization_endpoint.clone();
        Ok(config)
    }

    /// Set the redirect URI
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the default scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the token endpoint
    #[must_use]
    pub fn with_token_endpoint(mut self, token_endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(token_endpoint.into());
        self
    }

    /// Set the client secret
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_pkce() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"client_id": "c", "authorization_endpoint": "https://as/authorize"}"#,
        )
        .unwrap();
        assert!(config.use_pkce);
        assert!(config.client_secret.is_none());
    }

    #[test]
    fn secret_round_trips_through_serde() {
        let config = ClientConfig::new("c", "https://as/authorize").with_client_secret("s3cr3t");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("s3cr3t"));

        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.client_secret.unwrap().expose_secret(), "s3cr3t");
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = ClientConfig::new("c", "https://as/authorize").with_client_secret("s3cr3t");
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }

    #[test]
    fn from_provider_metadata_wires_endpoints() {
        let metadata: ProviderMetadata = serde_json::from_str(
            r#"{
                "issuer": "https://as.example.com",
                "authorization_endpoint": "https://as.example.com/authorize",
                "token_endpoint": "https://as.example.com/token"
            }"#,
        )
        .unwrap();

        let config = ClientConfig::from_provider_metadata(&metadata, "client-1").unwrap();
        assert_eq!(config.authorization_endpoint, "https://as.example.com/authorize");
        assert_eq!(config.token_endpoint.as_deref(), Some("https://as.example.com/token"));
    }

    #[test]
    fn metadata_without_authorization_endpoint_is_rejected() {
        let metadata: ProviderMetadata =
            serde_json::from_str(r#"{"issuer": "https://as.example.com"}"#).unwrap();
        let err = ClientConfig::from_provider_metadata(&metadata, "client-1").unwrap_err();
        assert!(matches!(err, FlowError::Protocol { .. }));
    }
}
