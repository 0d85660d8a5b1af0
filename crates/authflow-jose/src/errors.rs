//! Error types for the JOSE layer

use thiserror::Error;

/// Result alias used throughout this crate
pub type Result<T> = std::result::Result<T, JoseError>;

/// Errors produced while decoding, signing, or verifying JOSE material
///
/// Verification *failure* is not an error: [`crate::verify_signature`]
/// returns `Ok(false)` for a bad signature and reserves these variants for
/// structural and resolution problems.
#[derive(Debug, Error)]
pub enum JoseError {
    /// Malformed Base64URL or JWT structure
    #[error("malformed encoding: {reason}")]
    Decode {
        /// What failed to decode
        reason: String,
    },

    /// Input failed a shape check before any decoding was attempted
    #[error("invalid input: {reason}")]
    Validation {
        /// Which check failed
        reason: String,
    },

    /// JWT `alg` header is not in the supported set
    #[error("unsupported JWT algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// The offending `alg` value
        alg: String,
    },

    /// No usable signing key in discovery metadata or provided material
    #[error("no usable signing key: {reason}")]
    KeyResolution {
        /// Why resolution failed
        reason: String,
    },

    /// A certificate or key identifier did not resolve to usable material
    #[error("certificate or key material not found: {reason}")]
    CertificateResolution {
        /// Which identifier failed and why
        reason: String,
    },

    /// Transport failure while fetching discovery metadata or JWKS,
    /// propagated untouched
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl JoseError {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode { reason: reason.into() }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub(crate) fn key_resolution(reason: impl Into<String>) -> Self {
        Self::KeyResolution { reason: reason.into() }
    }

    pub(crate) fn certificate(reason: impl Into<String>) -> Self {
        Self::CertificateResolution { reason: reason.into() }
    }
}
