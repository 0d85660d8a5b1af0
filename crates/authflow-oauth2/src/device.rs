//! Device authorization (first leg of the device code flow)
//!
//! One POST to the device authorization endpoint, response returned
//! verbatim. The second leg is a [`crate::TokenGrant::DeviceCode`]
//! exchange through the [`crate::TokenClient`]; polling cadence is the
//! caller's business (the server's `interval` field says how often).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::token::oauth_error_from_body;

/// The device authorization response, verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    /// Code the device presents at the token endpoint
    pub device_code: String,

    /// Code the user types at the verification URI
    pub user_code: String,

    /// Where the user goes to approve the device
    pub verification_uri: String,

    /// Verification URI with the user code embedded, when offered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,

    /// Lifetime of the codes in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Minimum seconds between token polls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Display message some servers include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Any additional fields the server returned
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Client for the device authorization endpoint
#[derive(Debug, Clone)]
pub struct DeviceAuthorizationClient {
    http_client: reqwest::Client,
}

impl Default for DeviceAuthorizationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAuthorizationClient {
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

    /// Request device and user codes
    ///
    /// # Errors
    /// [`crate::FlowError::Http`] for transport failures,
    /// [`crate::FlowError::Authorization`] when the server answers with an
    /// OAuth error document.
    pub async fn request_device_authorization(
        &self,
        device_authorization_endpoint: &str,
        client_id: &str,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorization> {
        let mut form: Vec<(&str, &str)> = vec![("client_id", client_id)];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        debug!(
            endpoint = %device_authorization_endpoint,
            client_id = client_id,
            "requesting device authorization"
        );

        let response = self
            .http_client
            .post(device_authorization_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(oauth_error_from_body(status, &body));
        }

        Ok(response.json().await?)
    }
}
