//! Client assertion building for JWT-based client authentication
//!
//! Builds the signed jwt-bearer assertion a confidential client presents at
//! the token endpoint instead of (or alongside) a plain secret:
//! `private_key_jwt` signs with an RSA key, `client_secret_jwt` signs with
//! HMAC-SHA256 over the shared client secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use tracing::debug;
use uuid::Uuid;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::base64url;
use crate::errors::{JoseError, Result};
use crate::keys::AssertionKey;

/// The fixed `client_assertion_type` value for jwt-bearer assertions
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Assertion lifetime: `exp` is always issue time plus this many seconds
const ASSERTION_LIFETIME_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// A built client assertion, ready to place in a token request body
#[derive(Debug, Clone)]
pub struct ClientAssertion {
    /// The compact signed JWT
    pub jwt: String,
    /// The fixed jwt-bearer URN for the `client_assertion_type` field
    pub assertion_type: &'static str,
    /// The header that was signed
    pub header: Value,
    /// The payload that was signed
    pub payload: Value,
}

/// Build and sign a client assertion for the given client and token
/// endpoint
///
/// Claims: `aud` = token endpoint, `iss` = `sub` = client id, `iat` =
/// `nbf` = now, `exp` = now + 300s, `jti` = caller-supplied id or a fresh
/// UUID. Custom claims are merged first, so the registered claims always
/// win a collision.
///
/// The signing input is exactly
/// `base64url(header) + "." + base64url(payload)` in UTF-8. The HMAC path
/// standard-Base64-encodes the MAC before the URL-safe transform; deployed
/// servers expect that double encoding (see DESIGN.md).
///
/// # Errors
/// [`JoseError::CertificateResolution`] when signing fails and
/// [`JoseError::KeyResolution`] when the shared secret is unusable.
pub fn build_client_assertion(
    client_id: &str,
    token_endpoint: &str,
    key: &AssertionKey,
    jwt_id: Option<String>,
    custom_claims: &Map<String, Value>,
) -> Result<ClientAssertion> {
    let mut header = Map::new();
    header.insert("alg".into(), json!("RS256"));
    header.insert("typ".into(), json!("JWT"));
    if let AssertionKey::Rsa { thumbprint, key_id, .. } = key {
        if let Some(x5t) = thumbprint {
            header.insert("x5t".into(), json!(x5t));
        }
        if let Some(kid) = key_id {
            header.insert("kid".into(), json!(kid));
        }
    }

    let now = Utc::now().timestamp();
    let mut payload = custom_claims.clone();
    payload.insert("aud".into(), json!(token_endpoint));
    payload.insert("exp".into(), json!(now + ASSERTION_LIFETIME_SECS));
    payload.insert("iat".into(), json!(now));
    payload.insert("nbf".into(), json!(now));
    payload.insert("iss".into(), json!(client_id));
    payload.insert("sub".into(), json!(client_id));
    payload.insert(
        "jti".into(),
        json!(jwt_id.unwrap_or_else(|| Uuid::new_v4().to_string())),
    );

    let header = Value::Object(header);
    let payload = Value::Object(payload);

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| JoseError::validation(format!("assertion header not serializable: {e}")))?;
    let payload_json = serde_json::to_vec(&payload)
        .map_err(|e| JoseError::validation(format!("assertion payload not serializable: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        base64url::encode(header_json),
        base64url::encode(payload_json)
    );

    let signature = match key {
        AssertionKey::Rsa { key, .. } => rsa_signature(key, signing_input.as_bytes())?,
        AssertionKey::SharedSecret(secret) => hmac_signature(secret, signing_input.as_bytes())?,
    };

    debug!(
        client_id = client_id,
        audience = token_endpoint,
        "built client assertion"
    );

    Ok(ClientAssertion {
        jwt: format!("{signing_input}.{signature}"),
        assertion_type: JWT_BEARER_ASSERTION_TYPE,
        header,
        payload,
    })
}

/// RSA-SHA256 PKCS#1 v1.5 signature, Base64URL encoded
fn rsa_signature(key: &rsa::RsaPrivateKey, input: &[u8]) -> Result<String> {
    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
    let signature: rsa::pkcs1v15::Signature = signing_key
        .try_sign(input)
        .map_err(|e| JoseError::certificate(format!("RSA signing failed: {e}")))?;
    Ok(base64url::encode(signature.to_vec()))
}

/// HMAC-SHA256 over the signing input with the secret's UTF-8 bytes, then
/// standard Base64, then the URL-safe transform
pub(crate) fn hmac_signature(secret: &SecretString, input: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| JoseError::key_resolution("shared secret rejected by HMAC-SHA256"))?;
    mac.update(input);
    let tag = mac.finalize().into_bytes();
    Ok(base64url::encode(STANDARD.encode(tag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn test_rsa_key() -> AssertionKey {
        let mut rng = rand::thread_rng();
        AssertionKey::Rsa {
            key: RsaPrivateKey::new(&mut rng, 2048).unwrap(),
            thumbprint: None,
            key_id: None,
        }
    }

    #[test]
    fn assertion_lifetime_is_exactly_300_seconds() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let assertion =
            build_client_assertion("client-1", "https://as.example.com/token", &key, None, &Map::new())
                .unwrap();

        let exp = assertion.payload["exp"].as_i64().unwrap();
        let iat = assertion.payload["iat"].as_i64().unwrap();
        let nbf = assertion.payload["nbf"].as_i64().unwrap();
        assert_eq!(exp - iat, 300);
        assert_eq!(nbf, iat);
    }

    #[test]
    fn issuer_and_subject_are_the_client_id() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let assertion =
            build_client_assertion("client-1", "https://as.example.com/token", &key, None, &Map::new())
                .unwrap();

        assert_eq!(assertion.payload["iss"], "client-1");
        assert_eq!(assertion.payload["sub"], "client-1");
        assert_eq!(assertion.payload["aud"], "https://as.example.com/token");
        assert_eq!(assertion.assertion_type, JWT_BEARER_ASSERTION_TYPE);
    }

    #[test]
    fn jti_defaults_to_a_uuid_and_honors_override() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let generated =
            build_client_assertion("c", "https://t", &key, None, &Map::new()).unwrap();
        let jti = generated.payload["jti"].as_str().unwrap();
        assert!(Uuid::parse_str(jti).is_ok());

        let fixed =
            build_client_assertion("c", "https://t", &key, Some("my-jti".into()), &Map::new())
                .unwrap();
        assert_eq!(fixed.payload["jti"], "my-jti");
    }

    #[test]
    fn custom_claims_merge_but_cannot_displace_registered_claims() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let mut custom = Map::new();
        custom.insert("tenant".into(), json!("contoso"));
        custom.insert("iss".into(), json!("spoofed"));

        let assertion =
            build_client_assertion("client-1", "https://t", &key, None, &custom).unwrap();
        assert_eq!(assertion.payload["tenant"], "contoso");
        assert_eq!(assertion.payload["iss"], "client-1");
    }

    #[test]
    fn header_advertises_rs256_and_jwt() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let assertion = build_client_assertion("c", "https://t", &key, None, &Map::new()).unwrap();
        assert_eq!(assertion.header["alg"], "RS256");
        assert_eq!(assertion.header["typ"], "JWT");
        assert!(assertion.header.get("x5t").is_none());
    }

    #[test]
    fn certificate_thumbprint_lands_in_x5t_header() {
        let key = test_rsa_key()
            .with_certificate_der(b"certificate-der")
            .with_key_id("kid-7");
        let assertion = build_client_assertion("c", "https://t", &key, None, &Map::new()).unwrap();
        assert!(assertion.header["x5t"].is_string());
        assert_eq!(assertion.header["kid"], "kid-7");
    }

    #[test]
    fn hmac_signature_is_double_base64_encoded() {
        let secret = SecretString::new("s3cr3t".into());
        let input = b"fixed signing input";

        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(input);
        let tag = mac.finalize().into_bytes();
        let expected = base64url::encode(STANDARD.encode(tag));

        assert_eq!(hmac_signature(&secret, input).unwrap(), expected);
        // The inner standard encode is what makes this differ from a plain
        // Base64URL of the MAC bytes
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(input);
        let single = base64url::encode(mac.finalize().into_bytes());
        assert_ne!(hmac_signature(&secret, input).unwrap(), single);
    }

    #[test]
    fn compact_jwt_is_three_dot_separated_segments() {
        let key = AssertionKey::from_shared_secret("s3cr3t");
        let assertion = build_client_assertion("c", "https://t", &key, None, &Map::new()).unwrap();
        assert_eq!(assertion.jwt.split('.').count(), 3);
        assert!(assertion.jwt.starts_with("eyJ"));
    }
}
