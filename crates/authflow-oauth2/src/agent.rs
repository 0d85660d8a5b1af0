//! Capability contracts for the interactive parts of a flow
//!
//! The engine never drives a browser or opens a socket itself. The caller
//! injects:
//!
//! - a [`UserAgent`] that navigates to the authorization URI and blocks
//!   until the location matches a [`CompletionMatcher`] (or the user
//!   closes the interaction, which surfaces as a non-matching terminal
//!   location);
//! - a [`LoopbackReceiver`] that catches the single POST a `form_post`
//!   response mode produces and answers it with an empty 200.
//!
//! Implementations must honor a caller-supplied User-Agent string where
//! the underlying transport has one.

use async_trait::async_trait;

use crate::error::Result;

/// Decides when an interactive navigation has reached its terminal
/// location
///
/// A location is final when it is the redirect URI immediately followed by
/// `code=` or `error=` (in the query or fragment), or the bare redirect
/// URI with nothing after it. Without a known redirect URI, any location
/// carrying `code=` or `error=` counts.
#[derive(Debug, Clone)]
pub struct CompletionMatcher {
    redirect_prefix: Option<String>,
}

impl CompletionMatcher {
    /// Match completions against a known redirect URI
    pub fn for_redirect(redirect_uri: impl Into<String>) -> Self {
        Self { redirect_prefix: Some(redirect_uri.into()) }
    }

    /// Match any location that carries an authorization response
    #[must_use]
    pub fn any_callback() -> Self {
        Self { redirect_prefix: None }
    }

    /// Whether `location` terminates the interactive step
    #[must_use]
    pub fn is_final(&self, location: &str) -> bool {
        match &self.redirect_prefix {
            Some(prefix) => {
                let Some(rest) = location.strip_prefix(prefix.as_str()) else {
                    return false;
                };
                if rest.is_empty() {
                    return true; // bare redirect, no query
                }
                let Some(rest) = rest.strip_prefix(&['?', '#', '&'][..]) else {
                    return false; // a longer URI that merely shares the prefix
                };
                rest.is_empty() || rest.starts_with("code=") || rest.starts_with("error=")
            }
            None => location.contains("code=") || location.contains("error="),
        }
    }
}

/// An interactive user agent: browser, embedded webview, or a test fake
#[async_trait]
pub trait UserAgent: Send + Sync + std::fmt::Debug {
    /// Navigate to `uri` and block until the location satisfies
    /// `completion`, returning that final location
    ///
    /// A user-closed interaction should resolve with whatever terminal
    /// location the agent last saw; the engine maps a non-matching
    /// location to a protocol error during parsing.
    ///
    /// # Errors
    /// Implementation-defined transport or UI failures.
    async fn navigate(&self, uri: &str, completion: &CompletionMatcher) -> Result<String>;
}

/// A single-shot loopback receiver for `form_post` responses
#[async_trait]
pub trait LoopbackReceiver: Send + Sync + std::fmt::Debug {
    /// Listen on `uri_prefix`, accept exactly one POST, answer it with an
    /// empty 200, and return the raw request body
    ///
    /// # Errors
    /// Implementation-defined bind or accept failures.
    async fn listen(&self, uri_prefix: &str) -> Result<String>;
}
