//! Error types for the flow layer

use authflow_jose::JoseError;
use thiserror::Error;

/// Result alias used throughout this crate
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors produced while conducting a flow
///
/// None of these are retried here; retry policy belongs to whatever
/// transport or orchestration sits above the engine. Callers are expected
/// to report the structured fields intact, particularly the
/// [`FlowError::Authorization`] triplet.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The server reported an OAuth error, surfaced verbatim
    #[error("authorization server error: {error}")]
    Authorization {
        /// The OAuth error code (`access_denied`, `invalid_grant`, ...)
        error: String,
        /// Human-readable description, when the server sent one
        error_description: Option<String>,
        /// Documentation URI, when the server sent one
        error_uri: Option<String>,
    },

    /// The `state` echoed in the response does not match the request state
    #[error("state returned by the authorization server does not match the request state")]
    StateMismatch {
        /// The state sent with the request
        expected: String,
        /// The state found in the response
        received: String,
    },

    /// The `nonce` claim of a returned `id_token` does not match the
    /// request nonce
    #[error("id_token nonce does not match the request nonce")]
    NonceMismatch {
        /// The nonce sent with the request
        expected: String,
        /// The nonce claim found in the token
        received: String,
    },

    /// The loopback receiver produced no response in time
    #[error("no authorization response received within {seconds}s")]
    Timeout {
        /// How long the engine waited
        seconds: u64,
    },

    /// The server response matched none of the expected shapes
    #[error("invalid response received: {reason}")]
    Protocol {
        /// What was wrong with it
        reason: String,
    },

    /// A JOSE-layer failure (JWT decoding, assertion signing, key material)
    #[error(transparent)]
    Jose(#[from] JoseError),

    /// Transport failure, propagated untouched
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl FlowError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol { reason: reason.into() }
    }
}
