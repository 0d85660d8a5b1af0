//! Compact JWT decoding without verification
//!
//! Splits a compact JWT into header/payload/signature and decodes the first
//! two segments into structured claims. Decoding never verifies anything;
//! use [`crate::verify`] for that. Segments that are not valid JSON decode
//! to their raw string value instead of failing, because some servers ship
//! opaque payload segments inside otherwise well-formed tokens.

use serde_json::Value;

use crate::base64url;
use crate::errors::{JoseError, Result};

/// A decoded, unverified compact JWT
///
/// Header fields and payload claims are addressable through one lookup
/// surface: [`DecodedJwt::get`] resolves payload claims first and falls
/// back to header fields on a name collision. The raw signature segment is
/// kept as its original Base64URL string (empty for unsigned tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJwt {
    header: Value,
    claims: Value,
    signature: String,
}

impl DecodedJwt {
    /// Decode a compact JWT string
    ///
    /// Requires 2 segments (unsigned) or 3 (signed). The input must pass a
    /// shape check first: it starts with `eyJ` or `eyw` and consists of at
    /// least two dot-separated Base64URL groups.
    ///
    /// # Errors
    /// [`JoseError::Validation`] when the shape check fails,
    /// [`JoseError::Decode`] when a segment is not valid Base64URL.
    pub fn decode(token: &str) -> Result<Self> {
        check_compact_shape(token)?;

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() > 3 {
            return Err(JoseError::validation(format!(
                "expected 2 or 3 JWT segments, found {}",
                segments.len()
            )));
        }

        let header = decode_segment(segments[0])?;
        let claims = decode_segment(segments[1])?;
        let signature = segments.get(2).copied().unwrap_or("").to_string();

        Ok(Self { header, claims, signature })
    }

    /// Look up a value by name, payload claims taking precedence over
    /// header fields
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name).or_else(|| self.header.get(name))
    }

    /// Look up a string-valued claim or header field
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The decoded header (a JSON object, or the raw decoded string when
    /// the segment was not JSON)
    #[must_use]
    pub fn header(&self) -> &Value {
        &self.header
    }

    /// The decoded payload claims
    #[must_use]
    pub fn claims(&self) -> &Value {
        &self.claims
    }

    /// The raw Base64URL signature segment, empty for unsigned tokens
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The `alg` header field
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// The `typ` header field
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.header.get("typ").and_then(Value::as_str)
    }

    /// The `kid` header field
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }

    /// The `iss` payload claim
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }
}

/// Shape check applied before any decoding
///
/// A compact JWT starts with `eyJ` (or `eyw`, as emitted by some
/// serializers) and is at least two dot-separated Base64URL groups; the
/// first two groups must be non-empty.
fn check_compact_shape(token: &str) -> Result<()> {
    if !(token.starts_with("eyJ") || token.starts_with("eyw")) {
        return Err(JoseError::validation(
            "input does not look like a compact JWT (expected an eyJ/eyw prefix)",
        ));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() < 2 || segments[0].is_empty() || segments[1].is_empty() {
        return Err(JoseError::validation(
            "input does not look like a compact JWT (expected at least two dot-separated groups)",
        ));
    }

    for segment in &segments {
        if !segment.chars().all(is_base64url_char) {
            return Err(JoseError::validation(
                "JWT segment contains characters outside the Base64URL alphabet",
            ));
        }
    }

    Ok(())
}

fn is_base64url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='
}

/// Decode one segment: Base64URL, then JSON; non-JSON content is kept as
/// the raw decoded string
fn decode_segment(segment: &str) -> Result<Value> {
    let bytes = base64url::decode(segment)?;
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}
