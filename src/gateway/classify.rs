// src/gateway/classify.rs

//! Maps a non-success Gemini HTTP response to a [`ModelError`].
//!
//! Each handler recognises one family of failures; the classifier asks them in
//! order and falls back to a generic error when none matches.

use crate::error::ModelError;
use reqwest::StatusCode;
use tracing::warn;

/// One link of the classification chain.
pub trait StatusHandler: Send + Sync {
    /// `Some` if this handler recognises the response, `None` to defer to the
    /// next handler.
    fn classify(&self, status: StatusCode, body: &str) -> Option<ModelError>;
}

/// Invalid, revoked or unauthorised credential.
pub struct InvalidApiKeyHandler;

impl StatusHandler for InvalidApiKeyHandler {
    fn classify(&self, status: StatusCode, body: &str) -> Option<ModelError> {
        let invalid_key = status == StatusCode::BAD_REQUEST && body.contains("API_KEY_INVALID");
        if invalid_key || matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Some(ModelError::PermissionDenied(summarize(status, body)));
        }
        None
    }
}

/// Quota or per-minute limit hit.
pub struct RateLimitHandler;

impl StatusHandler for RateLimitHandler {
    fn classify(&self, status: StatusCode, body: &str) -> Option<ModelError> {
        if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
            return Some(ModelError::ResourceExhausted(summarize(status, body)));
        }
        None
    }
}

pub struct TimeoutHandler;

impl StatusHandler for TimeoutHandler {
    fn classify(&self, status: StatusCode, body: &str) -> Option<ModelError> {
        if matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT) {
            return Some(ModelError::DeadlineExceeded(summarize(status, body)));
        }
        None
    }
}

pub struct ServerErrorHandler;

impl StatusHandler for ServerErrorHandler {
    fn classify(&self, status: StatusCode, body: &str) -> Option<ModelError> {
        let message = summarize(status, body);
        match status {
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                Some(ModelError::ServiceUnavailable(message))
            }
            StatusCode::INTERNAL_SERVER_ERROR => Some(ModelError::Internal(message)),
            s if s.is_server_error() => Some(ModelError::Unknown(message)),
            _ => None,
        }
    }
}

/// Ordered chain of [`StatusHandler`]s.
pub struct ResponseClassifier {
    handlers: Vec<Box<dyn StatusHandler>>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(vec![
            Box::new(InvalidApiKeyHandler),
            Box::new(RateLimitHandler),
            Box::new(TimeoutHandler),
            Box::new(ServerErrorHandler),
        ])
    }
}

impl ResponseClassifier {
    #[must_use]
    pub fn new(handlers: Vec<Box<dyn StatusHandler>>) -> Self {
        Self { handlers }
    }

    pub fn classify(&self, status: StatusCode, body: &str) -> ModelError {
        let error = self
            .handlers
            .iter()
            .find_map(|handler| handler.classify(status, body))
            .unwrap_or_else(|| ModelError::Other(summarize(status, body)));
        warn!(status = status.as_u16(), error = %error, "Model call rejected");
        error
    }
}

/// Prefers the API's own `error.message` over the raw body.
fn summarize(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    format!("HTTP {}: {}", status.as_u16(), message.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(400, r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#, "permission")]
    #[case(403, "Forbidden", "permission")]
    #[case(401, "", "permission")]
    #[case(429, "Too Many Requests", "exhausted")]
    #[case(400, "RESOURCE_EXHAUSTED", "exhausted")]
    #[case(408, "", "deadline")]
    #[case(504, "Gateway Timeout", "deadline")]
    #[case(502, "Bad Gateway", "unavailable")]
    #[case(503, "Service Unavailable", "unavailable")]
    #[case(500, r#"{"error":{"code":500,"message":"An internal error has occurred.","status":"INTERNAL"}}"#, "internal")]
    #[case(599, "", "unknown")]
    #[case(404, "model not found", "other")]
    #[case(400, "Bad Request", "other")]
    fn test_classification(#[case] status: u16, #[case] body: &str, #[case] expected: &str) {
        let classifier = ResponseClassifier::default();
        let status = StatusCode::from_u16(status).unwrap();
        let kind = match classifier.classify(status, body) {
            ModelError::PermissionDenied(_) => "permission",
            ModelError::ResourceExhausted(_) => "exhausted",
            ModelError::DeadlineExceeded(_) => "deadline",
            ModelError::ServiceUnavailable(_) => "unavailable",
            ModelError::Internal(_) => "internal",
            ModelError::Unknown(_) => "unknown",
            ModelError::MalformedResponse(_) => "malformed",
            ModelError::Other(_) => "other",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_message_extracted_from_error_body() {
        let classifier = ResponseClassifier::default();
        let err = classifier.classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"code":500,"message":"An internal error has occurred.","status":"INTERNAL"}}"#,
        );
        assert_eq!(err.to_string(), "internal server error: HTTP 500: An internal error has occurred.");
    }
}
