//! Signing and verification key material
//!
//! Keys are explicit values threaded through calls, never process-global
//! state. [`AssertionKey`] is the signing side (client assertions);
//! [`VerificationKey`] is the verifying side (ID tokens, JWKS keys).

use std::fmt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use sha2::{Digest, Sha256};

use crate::base64url;
use crate::errors::{JoseError, Result};
use crate::jwks::Jwk;

/// Key material for signing a client assertion
///
/// Either an RSA private key (with an optional certificate thumbprint and
/// key id carried into the JWT header) or a shared secret for the HMAC
/// path.
#[derive(Clone)]
pub enum AssertionKey {
    /// RSA private key, signing with PKCS#1 v1.5 / SHA-256
    Rsa {
        /// The private key
        key: RsaPrivateKey,
        /// Base64URL certificate thumbprint, emitted as the `x5t` header
        thumbprint: Option<String>,
        /// Key id, emitted as the `kid` header
        key_id: Option<String>,
    },
    /// Shared secret, signing with HMAC-SHA256
    SharedSecret(SecretString),
}

// Manual Debug: RSA private key components and secrets must not reach logs
impl fmt::Debug for AssertionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa { thumbprint, key_id, .. } => f
                .debug_struct("AssertionKey::Rsa")
                .field("thumbprint", thumbprint)
                .field("key_id", key_id)
                .finish_non_exhaustive(),
            Self::SharedSecret(_) => f.write_str("AssertionKey::SharedSecret(..)"),
        }
    }
}

impl AssertionKey {
    /// Parse an RSA private key from a PEM string (PKCS#8 or PKCS#1)
    ///
    /// # Errors
    /// [`JoseError::CertificateResolution`] when the PEM does not contain a
    /// usable RSA private key.
    pub fn from_private_key_pem(pem: &str) -> Result<Self> {
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| {
                JoseError::certificate(format!("unable to parse RSA private key: {e}"))
            })?,
        };

        Ok(Self::Rsa { key, thumbprint: None, key_id: None })
    }

    /// Read and parse an RSA private key from a PEM file
    ///
    /// # Errors
    /// [`JoseError::CertificateResolution`] when the path cannot be read or
    /// does not contain a usable key.
    pub fn from_private_key_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            JoseError::certificate(format!("{}: {e}", path.display()))
        })?;
        Self::from_private_key_pem(&pem)
    }

    /// Wrap a shared secret for HMAC-signed assertions
    pub fn from_shared_secret(secret: impl Into<String>) -> Self {
        Self::SharedSecret(SecretString::new(secret.into()))
    }

    /// Attach a certificate in DER form; its SHA-256 thumbprint becomes the
    /// `x5t` header of built assertions
    #[must_use]
    pub fn with_certificate_der(self, der: &[u8]) -> Self {
        self.with_thumbprint(base64url::encode(Sha256::digest(der)))
    }

    /// Attach a certificate in PEM form; its SHA-256 thumbprint becomes the
    /// `x5t` header of built assertions
    ///
    /// # Errors
    /// [`JoseError::CertificateResolution`] when the PEM has no
    /// CERTIFICATE block.
    pub fn with_certificate_pem(self, pem: &str) -> Result<Self> {
        let der = pem_block_to_der(pem, "CERTIFICATE")?;
        Ok(self.with_certificate_der(&der))
    }

    /// Use a precomputed certificate thumbprint for the `x5t` header
    #[must_use]
    pub fn with_thumbprint(self, thumbprint: impl Into<String>) -> Self {
        match self {
            Self::Rsa { key, key_id, .. } => {
                Self::Rsa { key, thumbprint: Some(thumbprint.into()), key_id }
            }
            other => other,
        }
    }

    /// Set the `kid` header of built assertions
    #[must_use]
    pub fn with_key_id(self, key_id: impl Into<String>) -> Self {
        match self {
            Self::Rsa { key, thumbprint, .. } => {
                Self::Rsa { key, thumbprint, key_id: Some(key_id.into()) }
            }
            other => other,
        }
    }
}

/// A resolved public key for signature verification
#[derive(Debug, Clone)]
pub enum VerificationKey {
    /// RSA public key (RS* and PS* algorithms)
    Rsa(RsaPublicKey),
    /// NIST P-256 public key (ES256)
    EcP256(p256::ecdsa::VerifyingKey),
    /// NIST P-384 public key (ES384)
    EcP384(p384::ecdsa::VerifyingKey),
}

impl VerificationKey {
    /// Parse a public key from SPKI PEM, trying RSA then P-256 then P-384
    ///
    /// # Errors
    /// [`JoseError::CertificateResolution`] when none of the supported key
    /// types parse.
    pub fn from_public_key_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::EcP256(key));
        }
        if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::EcP384(key));
        }
        Err(JoseError::certificate(
            "PEM does not contain a supported RSA or EC public key",
        ))
    }

    /// Build a verification key from a JWK
    ///
    /// # Errors
    /// [`JoseError::KeyResolution`] when the JWK is missing parameters or
    /// uses an unsupported key type or curve.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        match jwk.kty.as_str() {
            "RSA" => {
                let n = decode_jwk_param(jwk.n.as_deref(), "n")?;
                let e = decode_jwk_param(jwk.e.as_deref(), "e")?;
                let key = RsaPublicKey::new(
                    rsa::BigUint::from_bytes_be(&n),
                    rsa::BigUint::from_bytes_be(&e),
                )
                .map_err(|e| JoseError::key_resolution(format!("invalid RSA JWK: {e}")))?;
                Ok(Self::Rsa(key))
            }
            "EC" => {
                let x = decode_jwk_param(jwk.x.as_deref(), "x")?;
                let y = decode_jwk_param(jwk.y.as_deref(), "y")?;
                let point = sec1_point(&x, &y);
                match jwk.crv.as_deref() {
                    Some("P-256") => p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                        .map(Self::EcP256)
                        .map_err(|e| {
                            JoseError::key_resolution(format!("invalid P-256 JWK: {e}"))
                        }),
                    Some("P-384") => p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                        .map(Self::EcP384)
                        .map_err(|e| {
                            JoseError::key_resolution(format!("invalid P-384 JWK: {e}"))
                        }),
                    other => Err(JoseError::key_resolution(format!(
                        "unsupported JWK curve: {}",
                        other.unwrap_or("<missing>")
                    ))),
                }
            }
            other => Err(JoseError::key_resolution(format!(
                "unsupported JWK key type: {other}"
            ))),
        }
    }
}

fn decode_jwk_param(value: Option<&str>, name: &str) -> Result<Vec<u8>> {
    let value = value
        .ok_or_else(|| JoseError::key_resolution(format!("JWK is missing the `{name}` parameter")))?;
    base64url::decode(value)
}

/// Uncompressed SEC1 point encoding: 0x04 || x || y
fn sec1_point(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    point
}

/// Extract the DER body of the first PEM block with the given label
fn pem_block_to_der(pem: &str, label: &str) -> Result<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem
        .find(&begin)
        .ok_or_else(|| JoseError::certificate(format!("no `{label}` block in PEM input")))?;
    let body_start = start + begin.len();
    let body_end = pem[body_start..]
        .find(&end)
        .map(|i| body_start + i)
        .ok_or_else(|| JoseError::certificate(format!("unterminated `{label}` block")))?;

    let body: String = pem[body_start..body_end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| JoseError::certificate(format!("invalid PEM body: {e}")))
}
