//! # AuthFlow OAuth2 - client-side OAuth 2.0 / OpenID Connect flows
//!
//! This crate conducts OAuth2/OIDC grants against an arbitrary
//! authorization server:
//!
//! - **Authorization code** (with PKCE), **implicit**, and **hybrid**
//!   response types through an injected interactive user agent
//! - **Device code** and **client credentials** grants
//! - **Refresh token** exchange
//! - Client authentication via secret (Basic or body), `client_secret_jwt`,
//!   and `private_key_jwt` assertions
//!
//! The pieces that touch a user sit behind two capability traits:
//! [`UserAgent`] drives the browser-or-webview interaction until the
//! redirect lands, and [`LoopbackReceiver`] catches the single POST a
//! `form_post` response mode produces. Both are injected, so the whole
//! engine is testable with fakes.
//!
//! # Security Invariants
//!
//! - The `state` echoed by the server MUST match the request state; a
//!   mismatch is always [`FlowError::StateMismatch`], never ignored.
//! - For OIDC, an `id_token`'s `nonce` claim MUST match the request nonce;
//!   a mismatch is always [`FlowError::NonceMismatch`].
//! - Client secrets live in [`secrecy::SecretString`] and are exposed
//!   just-in-time; they never reach logs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use authflow_oauth2::{AuthorizationClient, AuthorizationRequest, UserAgent};
//!
//! # async fn run(user_agent: Arc<dyn UserAgent>) -> Result<(), authflow_oauth2::FlowError> {
//! let client = AuthorizationClient::new(user_agent);
//! let request = AuthorizationRequest::new(
//!     "https://as.example.com/authorize",
//!     "my-client",
//!     "code",
//! )
//! .with_redirect_uri("http://127.0.0.1:8400/callback")
//! .with_scope("openid profile");
//!
//! let outcome = client.authorize(request).await?;
//! println!("authorization code: {:?}", outcome.code);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod authorize;
pub mod config;
pub mod device;
pub mod error;
pub mod pkce;
pub mod token;

// The JOSE layer, re-exported for callers that need direct access
pub use authflow_jose as jose;

#[doc(inline)]
pub use agent::{CompletionMatcher, LoopbackReceiver, UserAgent};
#[doc(inline)]
pub use authorize::{
    AuthorizationClient, AuthorizationRequest, AuthorizationResult, Protocol, ResponseMode,
};
#[doc(inline)]
pub use config::ClientConfig;
#[doc(inline)]
pub use device::{DeviceAuthorization, DeviceAuthorizationClient};
#[doc(inline)]
pub use error::{FlowError, Result};
#[doc(inline)]
pub use pkce::{PkceChallenge, generate_nonce, generate_state};
#[doc(inline)]
pub use token::{ClientAuth, TokenClient, TokenGrant, TokenRequest, TokenResponse};
