//! HTTP module: the rate limit gateway middleware and the counter actor service.

pub mod actor;
mod gateway;
pub mod probe;
mod response;
mod server;

pub use gateway::{
    apply_rate_limit_headers, rate_limit, RateLimitGateway, Verdict, DEFAULT_CALL_TIMEOUT,
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use response::{invalid_body, rate_limited};
pub use server::HttpServer;
