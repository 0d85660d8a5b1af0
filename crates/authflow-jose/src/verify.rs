//! JWT signature verification
//!
//! Verifies RS*/PS*/ES* and HMAC signatures over a compact JWT's signing
//! input. The verification key comes from caller-supplied material or,
//! when none is supplied, from the issuer's OIDC discovery metadata and
//! JWKS.
//!
//! A failed signature check is a `false` return, not an error; errors are
//! reserved for malformed tokens and key-resolution problems. The signing
//! input is always the literal substring before the token's last dot -
//! re-serializing the decoded JSON would break verification for servers
//! with different key ordering.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::assertion::hmac_signature;
use crate::base64url;
use crate::codec::DecodedJwt;
use crate::discovery;
use crate::errors::{JoseError, Result};
use crate::jwks::JwksClient;
use crate::keys::VerificationKey;

/// Verifier that caches JWKS clients per issuer across calls
///
/// The cache holds resolved key material only; it is written when an
/// issuer is first seen and read-only afterwards. For one-off checks the
/// free function [`verify_signature`] is enough.
#[derive(Debug, Default)]
pub struct JwtVerifier {
    clients: Arc<RwLock<HashMap<String, Arc<JwksClient>>>>,
}

impl JwtVerifier {
    /// Create a verifier with an empty JWKS cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify a compact JWT's signature
    ///
    /// Exactly one key source is consulted, in this order: the shared
    /// `secret` (HMAC), the supplied `key`, or the issuer's published JWKS
    /// selected by the token's `kid` header.
    ///
    /// Returns `Ok(false)` when the signature does not match; errors are
    /// structural (malformed token, unsupported algorithm, no resolvable
    /// key).
    ///
    /// # Errors
    /// [`JoseError::Decode`]/[`JoseError::Validation`] for malformed
    /// tokens, [`JoseError::UnsupportedAlgorithm`] for `alg` values outside
    /// the supported set, [`JoseError::KeyResolution`] when no key matches.
    pub async fn verify(
        &self,
        token: &str,
        key: Option<&VerificationKey>,
        secret: Option<&SecretString>,
    ) -> Result<bool> {
        let decoded = DecodedJwt::decode(token)?;
        if decoded.signature().is_empty() {
            debug!("token carries no signature segment");
            return Ok(false);
        }

        // The literal signing input: everything before the final dot
        let (signing_input, signature_segment) = token
            .rsplit_once('.')
            .ok_or_else(|| JoseError::validation("compact JWT has no signature separator"))?;

        if let Some(secret) = secret {
            let expected = hmac_signature(secret, signing_input.as_bytes())?;
            let matches = expected.as_bytes().ct_eq(signature_segment.as_bytes());
            return Ok(bool::from(matches));
        }

        let alg = decoded
            .algorithm()
            .ok_or_else(|| JoseError::validation("JWT header has no alg field"))?
            .to_string();

        let resolved;
        let key = match key {
            Some(key) => key,
            None => {
                resolved = self.resolve_from_discovery(&decoded).await?;
                &resolved
            }
        };

        let signature = base64url::decode(signature_segment)?;
        let verified = verify_with_key(&alg, key, signing_input.as_bytes(), &signature)?;
        if !verified {
            warn!(alg = %alg, "JWT signature verification failed");
        }
        Ok(verified)
    }

    /// Resolve a verification key from the issuer's discovery metadata
    async fn resolve_from_discovery(&self, decoded: &DecodedJwt) -> Result<VerificationKey> {
        let issuer = decoded
            .issuer()
            .ok_or_else(|| JoseError::key_resolution("token has no iss claim to discover keys from"))?;
        let kid = decoded
            .key_id()
            .ok_or_else(|| JoseError::key_resolution("token header has no kid to select a JWK"))?
            .to_string();

        let client = self.client_for_issuer(issuer).await?;
        let keys = client.get_keys().await?;
        let jwk = keys.find(&kid).ok_or_else(|| {
            JoseError::key_resolution(format!("no JWK in {} matches kid `{kid}`", client.jwks_uri()))
        })?;

        VerificationKey::from_jwk(jwk)
    }

    async fn client_for_issuer(&self, issuer: &str) -> Result<Arc<JwksClient>> {
        let issuer = discovery::normalize_issuer(issuer);

        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&issuer) {
                return Ok(Arc::clone(client));
            }
        }

        let metadata = discovery::fetch_provider_metadata(&issuer).await?;
        let jwks_uri = metadata
            .jwks_uri
            .ok_or_else(|| JoseError::key_resolution("provider metadata has no jwks_uri"))?;
        let client = Arc::new(JwksClient::new(jwks_uri));

        let mut clients = self.clients.write().await;
        Ok(Arc::clone(clients.entry(issuer).or_insert(client)))
    }
}

/// One-shot signature verification without a persistent JWKS cache
///
/// See [`JwtVerifier::verify`] for semantics.
///
/// # Errors
/// Same as [`JwtVerifier::verify`].
pub async fn verify_signature(
    token: &str,
    key: Option<&VerificationKey>,
    secret: Option<&SecretString>,
) -> Result<bool> {
    JwtVerifier::new().verify(token, key, secret).await
}

/// Dispatch on the `alg` prefix and digest suffix
fn verify_with_key(
    alg: &str,
    key: &VerificationKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool> {
    if let Some(digits) = alg.strip_prefix("RS") {
        let VerificationKey::Rsa(public_key) = key else {
            return Err(JoseError::key_resolution(format!("{alg} requires an RSA key")));
        };
        return verify_rsa_pkcs1v15(alg, digits, public_key, input, signature);
    }

    if let Some(digits) = alg.strip_prefix("PS") {
        let VerificationKey::Rsa(public_key) = key else {
            return Err(JoseError::key_resolution(format!("{alg} requires an RSA key")));
        };
        return verify_rsa_pss(alg, digits, public_key, input, signature);
    }

    if let Some(digits) = alg.strip_prefix("ES") {
        return verify_ecdsa(alg, digits, key, input, signature);
    }

    Err(JoseError::UnsupportedAlgorithm { alg: alg.to_string() })
}

fn verify_rsa_pkcs1v15(
    alg: &str,
    digits: &str,
    public_key: &rsa::RsaPublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool> {
    use rsa::pkcs1v15::{Signature, VerifyingKey};

    let Ok(signature) = Signature::try_from(signature) else {
        return Ok(false);
    };

    Ok(match digits {
        "256" => VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        "384" => VerifyingKey::<Sha384>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        "512" => VerifyingKey::<Sha512>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        _ => return Err(JoseError::UnsupportedAlgorithm { alg: alg.to_string() }),
    })
}

fn verify_rsa_pss(
    alg: &str,
    digits: &str,
    public_key: &rsa::RsaPublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool> {
    use rsa::pss::{Signature, VerifyingKey};

    let Ok(signature) = Signature::try_from(signature) else {
        return Ok(false);
    };

    Ok(match digits {
        "256" => VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        "384" => VerifyingKey::<Sha384>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        "512" => VerifyingKey::<Sha512>::new(public_key.clone())
            .verify(input, &signature)
            .is_ok(),
        _ => return Err(JoseError::UnsupportedAlgorithm { alg: alg.to_string() }),
    })
}

fn verify_ecdsa(
    alg: &str,
    digits: &str,
    key: &VerificationKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool> {
    match (digits, key) {
        ("256", VerificationKey::EcP256(verifying_key)) => {
            let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(input, &signature).is_ok())
        }
        ("384", VerificationKey::EcP384(verifying_key)) => {
            let Ok(signature) = p384::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(input, &signature).is_ok())
        }
        ("256" | "384", _) => Err(JoseError::key_resolution(format!(
            "{alg} requires an EC key on the matching curve"
        ))),
        _ => Err(JoseError::UnsupportedAlgorithm { alg: alg.to_string() }),
    }
}
