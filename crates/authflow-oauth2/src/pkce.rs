//! PKCE (Proof Key for Code Exchange) and per-request random material
//!
//! Generates the verifier/challenge pair for the authorization code flow
//! (RFC 7636) and the `state`/`nonce` values every authorization request
//! carries. All random material is drawn from the operating system CSPRNG
//! via `rand::thread_rng`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Characters allowed in verifiers, state, and nonce values
/// (RFC 7636 unreserved characters)
const UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Verifier length bounds per RFC 7636
const VERIFIER_MIN_LENGTH: usize = 43;
const VERIFIER_MAX_LENGTH: usize = 128;

/// A PKCE verifier/challenge pair
///
/// Immutable once generated and used for exactly one authorization
/// request: the challenge goes into the authorization URI, the verifier
/// into the subsequent token exchange.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// The code verifier (secret, presented at the token endpoint)
    pub code_verifier: String,

    /// The code challenge (sent in the authorization URI)
    pub code_challenge: String,

    /// The challenge method: `S256`, or `plain` for servers that reject it
    pub code_challenge_method: &'static str,
}

impl PkceChallenge {
    /// Generate a fresh S256 pair
    ///
    /// The verifier length is drawn uniformly from 43..=128 so different
    /// requests do not share a recognizable shape.
    #[must_use]
    pub fn generate() -> Self {
        let length = rand::thread_rng().gen_range(VERIFIER_MIN_LENGTH..=VERIFIER_MAX_LENGTH);
        Self::with_verifier_length(length)
    }

    /// Generate an S256 pair with a fixed verifier length
    ///
    /// The length is clamped to the RFC 7636 range 43..=128.
    #[must_use]
    pub fn with_verifier_length(length: usize) -> Self {
        let length = length.clamp(VERIFIER_MIN_LENGTH, VERIFIER_MAX_LENGTH);
        let code_verifier = random_token(length, length);
        let code_challenge = Self::compute_challenge(&code_verifier);
        Self { code_verifier, code_challenge, code_challenge_method: "S256" }
    }

    /// Build a `plain` pair where the challenge equals the verifier
    ///
    /// Only for servers that do not accept S256; the flow must never fail
    /// just because hashing is off the table.
    #[must_use]
    pub fn plain() -> Self {
        let length = rand::thread_rng().gen_range(VERIFIER_MIN_LENGTH..=VERIFIER_MAX_LENGTH);
        let code_verifier = random_token(length, length);
        Self {
            code_challenge: code_verifier.clone(),
            code_verifier,
            code_challenge_method: "plain",
        }
    }

    /// The S256 challenge for a verifier:
    /// `base64url(SHA-256(ASCII(verifier)))`
    #[must_use]
    pub fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// Generate a CSRF `state` value (16-21 characters)
#[must_use]
pub fn generate_state() -> String {
    random_token(16, 21)
}

/// Generate an OIDC `nonce` value (32-64 characters)
#[must_use]
pub fn generate_nonce() -> String {
    random_token(32, 64)
}

/// A random string over the unreserved alphabet, length drawn uniformly
/// from `min..=max`
fn random_token(min: usize, max: usize) -> String {
    let mut rng = rand::thread_rng();
    let length = if min == max { min } else { rng.gen_range(min..=max) };
    (0..length)
        .map(|_| {
            let index = rng.gen_range(0..UNRESERVED.len());
            UNRESERVED[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_alphabet(value: &str) -> bool {
        value.bytes().all(|b| UNRESERVED.contains(&b))
    }

    #[test]
    fn verifier_length_stays_in_range() {
        for _ in 0..50 {
            let pkce = PkceChallenge::generate();
            assert!((43..=128).contains(&pkce.code_verifier.len()));
            assert!(in_alphabet(&pkce.code_verifier));
        }
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.code_challenge_method, "S256");
        assert_eq!(
            pkce.code_challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.code_verifier.as_bytes()))
        );
        // SHA-256 output is always 43 unpadded Base64URL characters
        assert_eq!(pkce.code_challenge.len(), 43);
    }

    #[test]
    fn fixed_length_is_clamped() {
        assert_eq!(PkceChallenge::with_verifier_length(10).code_verifier.len(), 43);
        assert_eq!(PkceChallenge::with_verifier_length(200).code_verifier.len(), 128);
        assert_eq!(PkceChallenge::with_verifier_length(64).code_verifier.len(), 64);
    }

    #[test]
    fn plain_challenge_equals_verifier() {
        let pkce = PkceChallenge::plain();
        assert_eq!(pkce.code_challenge, pkce.code_verifier);
        assert_eq!(pkce.code_challenge_method, "plain");
    }

    #[test]
    fn pairs_are_unique() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn state_and_nonce_lengths() {
        for _ in 0..50 {
            assert!((16..=21).contains(&generate_state().len()));
            assert!((32..=64).contains(&generate_nonce().len()));
        }
        assert!(in_alphabet(&generate_state()));
        assert!(in_alphabet(&generate_nonce()));
    }
}
