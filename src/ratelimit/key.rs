//! Rate limit key derivation.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName};

/// Header carrying the proxy chain, leftmost entry is the client.
pub const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Default trusted client-IP header set by the edge proxy.
pub const DEFAULT_TRUSTED_IP_HEADER: &str = "cf-connecting-ip";

/// A key that identifies one rate limit counter.
///
/// Built-in keys take the form `user:<id>` or `ip:<address>`, but any
/// string produced by a custom [`KeyDeriver`] is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Key for an authenticated user.
    pub fn user(user_id: &str) -> Self {
        Self(format!("user:{}", user_id))
    }

    /// Key for a client address.
    pub fn ip(address: &str) -> Self {
        Self(format!("ip:{}", address))
    }

    /// The key callers fall back to when no address is known.
    pub fn unknown() -> Self {
        Self::ip("unknown")
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RateLimitKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for RateLimitKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request extension inserted by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Maps an inbound request to its rate limit key.
///
/// Implementations must be total: every request gets a key.
pub trait KeyDeriver: Send + Sync {
    fn derive(&self, request: &Request) -> RateLimitKey;
}

impl<F> KeyDeriver for F
where
    F: Fn(&Request) -> RateLimitKey + Send + Sync,
{
    fn derive(&self, request: &Request) -> RateLimitKey {
        self(request)
    }
}

/// Authenticated user first, then client IP.
#[derive(Debug, Clone)]
pub struct DefaultKeyDeriver {
    trusted_ip_header: HeaderName,
}

impl DefaultKeyDeriver {
    /// Use `trusted_ip_header` as the first source of the client address.
    pub fn new(trusted_ip_header: HeaderName) -> Self {
        Self { trusted_ip_header }
    }
}

impl Default for DefaultKeyDeriver {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_TRUSTED_IP_HEADER))
    }
}

impl KeyDeriver for DefaultKeyDeriver {
    fn derive(&self, request: &Request) -> RateLimitKey {
        let user = request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|u| u.0.as_str());
        derive_key(user, request.headers(), &self.trusted_ip_header)
    }
}

/// Derive a key from an optional user id and the request headers.
pub fn derive_key(
    user_id: Option<&str>,
    headers: &HeaderMap,
    trusted_ip_header: &HeaderName,
) -> RateLimitKey {
    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        return RateLimitKey::user(user_id);
    }

    client_ip(headers, trusted_ip_header)
        .map(RateLimitKey::ip)
        .unwrap_or_else(RateLimitKey::unknown)
}

fn client_ip<'a>(headers: &'a HeaderMap, trusted_ip_header: &HeaderName) -> Option<&'a str> {
    let trusted = headers
        .get(trusted_ip_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    trusted.or_else(|| {
        headers
            .get(&FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    })
}
