//! # AuthFlow JOSE - JWT plumbing for the AuthFlow client engine
//!
//! This crate carries the JOSE-side primitives the flow layer builds on:
//!
//! - **Base64URL codec** - the URL-safe, unpadded Base64 variant used for
//!   JWT segments and PKCE challenges
//! - **Compact JWT codec** - split/decode without verification, tolerant of
//!   non-JSON segments
//! - **Client assertions** - signed jwt-bearer assertions for
//!   `client_secret_jwt` and `private_key_jwt` client authentication
//! - **Signature verification** - RS*/PS*/ES* and HMAC verification over
//!   the exact compact signing input, with key resolution from supplied
//!   material or OIDC discovery
//! - **JWKS** - fetching and TTL caching of JSON Web Key Sets
//! - **Discovery** - `.well-known/openid-configuration` metadata
//!
//! # Security Considerations
//!
//! - Verification always operates on the literal first two dot-joined
//!   segments of the compact token. Re-serializing decoded JSON would break
//!   verification for servers with different key ordering.
//! - HMAC comparisons are constant-time (`subtle`).
//! - Shared secrets are held as [`secrecy::SecretString`] and exposed
//!   just-in-time for signing; they are never logged.
//!
//! # Example
//!
//! ```rust
//! use authflow_jose::DecodedJwt;
//!
//! let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJhbGljZSJ9.c2ln";
//! let decoded = DecodedJwt::decode(token)?;
//! assert_eq!(decoded.algorithm(), Some("HS256"));
//! assert_eq!(decoded.claim_str("sub"), Some("alice"));
//! # Ok::<(), authflow_jose::JoseError>(())
//! ```

pub mod assertion;
pub mod base64url;
pub mod codec;
pub mod discovery;
pub mod errors;
pub mod jwks;
pub mod keys;
pub mod verify;

#[doc(inline)]
pub use assertion::{ClientAssertion, JWT_BEARER_ASSERTION_TYPE, build_client_assertion};
#[doc(inline)]
pub use codec::DecodedJwt;
#[doc(inline)]
pub use discovery::{ProviderMetadata, fetch_provider_metadata, normalize_issuer};
#[doc(inline)]
pub use errors::{JoseError, Result};
#[doc(inline)]
pub use jwks::{Jwk, JwkSet, JwksClient};
#[doc(inline)]
pub use keys::{AssertionKey, VerificationKey};
#[doc(inline)]
pub use verify::{JwtVerifier, verify_signature};
