//! Shared HTTP client construction policy for resolvers.
//!
//! Centralizes timeout, user-agent, and compression defaults so site
//! resolvers stay consistent with each other.

use std::time::Duration;

use reqwest::Client;

use super::ResolveError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Shared browser-like user agent.
///
/// The session-authenticated endpoints these resolvers talk to serve
/// different payloads (or refuse) for obvious non-browser agents.
const RESOLVER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Builds a resolver HTTP client using the shared policy.
///
/// `resolver_name` is used only in error messages, never in request headers.
///
/// # Errors
///
/// Returns [`ResolveError::Network`] when client construction fails.
pub fn build_resolver_http_client(resolver_name: &str) -> Result<Client, ResolveError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(RESOLVER_USER_AGENT)
        .gzip(true)
        .build()
        .map_err(|e| {
            ResolveError::network(
                resolver_name,
                format!("HTTP client construction failed: {e}"),
            )
        })
}
