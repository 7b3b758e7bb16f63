//! A gateway-protected route for checking a deployment end to end.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};

use super::gateway::{rate_limit, RateLimitGateway};
use crate::ratelimit::RateLimitKey;

/// `GET /v1/probe` behind `gateway`; echoes the key the request was counted under.
pub fn router(gateway: Arc<RateLimitGateway>) -> Router {
    Router::new()
        .route("/v1/probe", get(probe))
        .layer(from_fn_with_state(gateway, rate_limit))
}

async fn probe(Extension(key): Extension<RateLimitKey>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "key": key.to_string() },
    }))
}
