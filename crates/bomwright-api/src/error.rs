//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use bomwright_enrich::EnrichError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 404 Not Found - unknown session.
    NotFound(String),
    /// 409 Conflict - the session cannot accept more turns.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - the completion service failed.
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Completion service error");
                (StatusCode::BAD_GATEWAY, "bad_gateway", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<EnrichError> for ApiError {
    fn from(err: EnrichError) -> Self {
        match err {
            EnrichError::EmptyMessage | EnrichError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EnrichError::TurnLimitReached { .. } => ApiError::Conflict(err.to_string()),
            EnrichError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            EnrichError::Completion(_) => ApiError::BadGateway(err.to_string()),
            EnrichError::InvalidTransition(..) | EnrichError::StorageError(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bomwright_enrich::CompletionError;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_enrich_error_status_codes() {
        assert_eq!(status_of(EnrichError::EmptyMessage), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(EnrichError::MessageTooLong(10)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(EnrichError::TurnLimitReached { max: 20 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EnrichError::SessionNotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EnrichError::Completion(CompletionError::EmptyResponse)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(EnrichError::StorageError("poisoned".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_json_rejection_is_bad_request_body() {
        use axum::body::Body;
        use axum::extract::FromRequest;
        use axum::http::Request;

        #[derive(Debug, serde::Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            message: String,
        }

        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"session_id": "s1"}"#))
            .unwrap();
        let rejection = Json::<Payload>::from_request(request, &()).await.unwrap_err();

        let response = ApiError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "bad_request");
        assert!(json["message"].as_str().unwrap().contains("message"));
    }
}
