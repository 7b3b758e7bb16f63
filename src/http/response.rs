//! JSON error envelopes shared by the gateway and the actor service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// `{ "success": false, "error": { ... } }`
#[derive(Debug, Serialize)]
pub(crate) struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    pub code: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorEnvelope {
    fn new(code: &'static str, message: &'static str, retry_after: Option<u64>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message,
                retry_after,
            },
        }
    }
}

/// 429 body for a denied request.
pub fn rate_limited(retry_after: Option<u64>) -> Response {
    let body = ErrorEnvelope::new(
        "RATE_LIMITED",
        "Too many requests, please try again later",
        retry_after,
    );
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

/// 400 body for a check call whose payload could not be understood.
pub fn invalid_body() -> Response {
    let body = ErrorEnvelope::new("INVALID_BODY", "Invalid request body", None);
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limited_shape() {
        let body = serde_json::to_value(ErrorEnvelope::new(
            "RATE_LIMITED",
            "Too many requests, please try again later",
            Some(12),
        ))
        .unwrap();

        assert_eq!(
            body,
            json!({
                "success": false,
                "error": {
                    "code": "RATE_LIMITED",
                    "message": "Too many requests, please try again later",
                    "retryAfter": 12
                }
            })
        );
    }

    #[test]
    fn test_missing_retry_after_is_omitted() {
        let body = serde_json::to_value(ErrorEnvelope::new("X", "y", None)).unwrap();
        assert!(body["error"].get("retryAfter").is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(rate_limited(Some(1)).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(invalid_body().status(), StatusCode::BAD_REQUEST);
    }
}
