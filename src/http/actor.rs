//! HTTP surface of the counter actors.
//!
//! `POST /v1/counters/{key}/check` with `{"limit": n, "windowSeconds": n}`
//! and `POST /v1/counters/{key}/reset`, addressed by rate limit key.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::response::invalid_body;
use crate::ratelimit::{CounterRegistry, RateLimitKey, RateLimitPolicy};

/// Routes for the counter actor service, plus `/health`.
pub fn router(registry: Arc<CounterRegistry>) -> Router {
    Router::new()
        .route("/v1/counters/{key}/check", post(check))
        .route("/v1/counters/{key}/reset", post(reset))
        .route("/health", get(health))
        .with_state(registry)
}

#[instrument(skip_all, fields(key = %key))]
async fn check(
    State(registry): State<Arc<CounterRegistry>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    let policy: RateLimitPolicy = match serde_json::from_slice(&body) {
        Ok(policy) => policy,
        Err(err) => {
            debug!(error = %err, "Rejecting malformed check body");
            return invalid_body();
        }
    };

    let decision = registry.check_and_increment(&RateLimitKey::from(key), policy);
    Json(decision).into_response()
}

#[instrument(skip_all, fields(key = %key))]
async fn reset(
    State(registry): State<Arc<CounterRegistry>>,
    Path(key): Path<String>,
) -> StatusCode {
    registry.reset(&RateLimitKey::from(key));
    StatusCode::NO_CONTENT
}

async fn health(State(registry): State<Arc<CounterRegistry>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "counters": registry.counter_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use axum::body::Body;
    use axum::extract::Request;
    use tower::ServiceExt;

    const T0: u64 = 1_700_000_000_000;

    fn test_router() -> (Router, Arc<CounterRegistry>) {
        let registry = Arc::new(CounterRegistry::with_clock(Arc::new(ManualClock::new(T0))));
        (router(registry.clone()), registry)
    }

    fn post_json(uri: &str, body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_check_returns_decision() {
        let (app, _) = test_router();

        let response = app
            .oneshot(post_json(
                "/v1/counters/ip:1.2.3.4/check",
                r#"{"limit": 5, "windowSeconds": 60}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["remaining"], 4);
        assert_eq!(body["resetAt"], T0 + 60_000);
    }

    #[tokio::test]
    async fn test_non_json_body_is_400() {
        let (app, registry) = test_router();

        let response = app
            .oneshot(post_json("/v1/counters/ip:1.2.3.4/check", "limit=5"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INVALID_BODY");
        assert_eq!(body["error"]["message"], "Invalid request body");
        // Nothing was counted.
        assert_eq!(registry.counter_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_policy_is_400() {
        let (app, _) = test_router();

        let missing = app
            .clone()
            .oneshot(post_json("/v1/counters/k/check", r#"{"limit": 5}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let zero = app
            .oneshot(post_json(
                "/v1/counters/k/check",
                r#"{"limit": 0, "windowSeconds": 60}"#,
            ))
            .await
            .unwrap();
        assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_window_is_400_and_keeps_count() {
        let (app, registry) = test_router();
        let key = RateLimitKey::ip("1.2.3.4");
        registry.check_and_increment(&key, RateLimitPolicy::new(5, 60).unwrap());

        let response = app
            .oneshot(post_json(
                "/v1/counters/ip:1.2.3.4/check",
                r#"{"limit": 1, "windowSeconds": 18446744073709551615}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_BODY");
        assert_eq!(registry.counter_value(&key), Some(1));
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let (app, registry) = test_router();
        let key = RateLimitKey::user("bob");
        let policy = RateLimitPolicy::new(1, 60).unwrap();
        registry.check_and_increment(&key, policy);
        registry.check_and_increment(&key, policy);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/counters/user:bob/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(registry.counter_value(&key), Some(0));
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let (app, registry) = test_router();
        registry.check_and_increment(&RateLimitKey::user("a"), RateLimitPolicy::new(1, 1).unwrap());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["counters"], 1);
    }
}
