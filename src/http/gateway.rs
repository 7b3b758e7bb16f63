//! Rate limit gateway middleware.
//!
//! Sits in front of a route group, consults the counter actor for the
//! request's key and either lets the request through with `X-RateLimit-*`
//! headers or answers 429. When the actor cannot be consulted the request
//! is let through untouched (fail open).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use super::response::rate_limited;
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{
    CounterBackend, Decision, DefaultKeyDeriver, KeyDeriver, RateLimitKey, RateLimitPolicy,
};

/// How long a request waits on the counter actor by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(250);

/// `Retry-After` value when the decision carries none.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// What the gateway does with one request.
#[derive(Debug)]
pub enum Verdict {
    /// Within quota: run the protected operation and attach headers
    Admit(Decision),
    /// Over quota: answer 429
    Deny(Decision),
    /// The actor could not be consulted: run the protected operation, no headers
    FailOpen(GatekeeperError),
}

/// Per-route-group rate limit gateway.
#[derive(Clone)]
pub struct RateLimitGateway {
    backend: Arc<dyn CounterBackend>,
    deriver: Arc<dyn KeyDeriver>,
    policy: RateLimitPolicy,
    call_timeout: Duration,
}

impl RateLimitGateway {
    /// Gateway enforcing `policy` with the default key deriver and call timeout.
    pub fn new(backend: Arc<dyn CounterBackend>, policy: RateLimitPolicy) -> Self {
        Self {
            backend,
            deriver: Arc::new(DefaultKeyDeriver::default()),
            policy,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Replace the key deriver.
    pub fn with_deriver<D: KeyDeriver + 'static>(mut self, deriver: D) -> Self {
        self.deriver = Arc::new(deriver);
        self
    }

    /// Bound the wait on the counter actor.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Consult the counter actor for `key`.
    ///
    /// Only the wait is bounded: an increment already running inside the
    /// actor still completes after a timeout.
    pub async fn evaluate(&self, key: &RateLimitKey) -> Verdict {
        match self.consult(key).await {
            Ok(decision) if decision.allowed => Verdict::Admit(decision),
            Ok(decision) => Verdict::Deny(decision),
            Err(err) => Verdict::FailOpen(err),
        }
    }

    async fn consult(&self, key: &RateLimitKey) -> Result<Decision> {
        tokio::time::timeout(self.call_timeout, self.backend.check(key, self.policy))
            .await
            .map_err(|_| GatekeeperError::Timeout(self.call_timeout))?
    }

    /// Run one request through the gateway.
    pub async fn handle(&self, mut request: Request, next: Next) -> Response {
        let key = self.deriver.derive(&request);

        match self.evaluate(&key).await {
            Verdict::Admit(decision) => {
                request.extensions_mut().insert(key);
                let mut response = next.run(request).await;
                apply_rate_limit_headers(response.headers_mut(), &decision);
                response
            }
            Verdict::Deny(decision) => {
                debug!(
                    key = %key,
                    count = decision.count,
                    limit = decision.limit,
                    "Request rate limited"
                );
                let retry_after = decision.retry_after_seconds;
                let mut response = rate_limited(retry_after);
                let headers = response.headers_mut();
                apply_rate_limit_headers(headers, &decision);
                headers.insert(
                    axum::http::header::RETRY_AFTER,
                    HeaderValue::from(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
                );
                response
            }
            Verdict::FailOpen(err) => {
                warn!(
                    key = %key,
                    limit = self.policy.limit(),
                    window_seconds = self.policy.window_seconds(),
                    error = %err,
                    "Rate limiter unavailable, failing open"
                );
                request.extensions_mut().insert(key);
                next.run(request).await
            }
        }
    }
}

/// Axum middleware entry point, for use with `axum::middleware::from_fn_with_state`.
pub async fn rate_limit(
    State(gateway): State<Arc<RateLimitGateway>>,
    request: Request,
    next: Next,
) -> Response {
    gateway.handle(request, next).await
}

/// Set the three `X-RateLimit-*` headers from a decision.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at_secs()));
}
