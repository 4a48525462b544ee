//! Error taxonomy for the inference server client.
//!
//! Every failure a logical call can end in is an [`OllamaError`]. The
//! [`ErrorKind`] lets callers tell apart "the server rejected this"
//! (`InvalidRequest`, `ModelNotFound`, `Server`, `Api`), "the server could not
//! be reached" (`ConnectionFailure`, `Timeout`) and "the response was
//! unparseable" (`Streaming`, `Parse`).

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Classification of an [`OllamaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket, DNS or refused connection.
    ConnectionFailure,
    /// No response within budget after all retries, or server 408/504.
    Timeout,
    /// 404 or unresolvable model name.
    ModelNotFound,
    /// 400 from the server.
    InvalidRequest,
    /// 5xx or 429 from the server.
    Server,
    /// Malformed NDJSON line or premature stream termination.
    Streaming,
    /// Single-shot response body that is not valid JSON.
    Parse,
    /// Client could not be constructed from its configuration.
    Config,
    /// Anything else.
    Api,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailure => "connection failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Server => "server error",
            ErrorKind::Streaming => "streaming error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Config => "config error",
            ErrorKind::Api => "API error",
        }
    }

    /// Map an HTTP error status to its kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::InvalidRequest,
            404 => ErrorKind::ModelNotFound,
            408 | 504 => ErrorKind::Timeout,
            429 | 500 | 502 | 503 => ErrorKind::Server,
            _ => ErrorKind::Api,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed logical call.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct OllamaError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    raw_body: Option<String>,
    payload: Option<Value>,
    model: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

pub type Result<T> = std::result::Result<T, OllamaError>;

impl OllamaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            raw_body: None,
            payload: None,
            model: None,
            source: None,
        }
    }

    /// Build the error for an HTTP error response.
    ///
    /// The message is taken from the structured `error` field when the body
    /// is JSON, else the raw text, else `HTTP <status>`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let payload = serde_json::from_str::<Value>(body).ok();
        let structured = payload.as_ref().and_then(|p| match p.get("error") {
            Some(Value::String(msg)) => Some(msg.clone()),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        });
        let message = structured.unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {status}")
            } else {
                trimmed.to_string()
            }
        });

        let mut err = Self::new(ErrorKind::from_status(status), message);
        err.status = Some(status);
        if !body.is_empty() {
            err.raw_body = Some(body.to_string());
        }
        err.payload = payload;
        err
    }

    pub(crate) fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the model the failed call was made with, unless already set.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        if self.model.is_none() {
            self.model = Some(model.into());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn raw_body(&self) -> Option<&str> {
        self.raw_body.as_deref()
    }

    /// Parsed JSON error payload, if the body was JSON.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Model the failing call was made with.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }

    /// Whether the server gave a definitive answer (any HTTP error status).
    pub fn is_server_answer(&self) -> bool {
        self.status.is_some()
    }

    /// Whether this error qualifies for a model substitution.
    pub fn is_fallback_candidate(&self) -> bool {
        matches!(self.kind, ErrorKind::ModelNotFound | ErrorKind::Server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_table() {
        let table = [
            (400, ErrorKind::InvalidRequest),
            (404, ErrorKind::ModelNotFound),
            (408, ErrorKind::Timeout),
            (429, ErrorKind::Server),
            (500, ErrorKind::Server),
            (502, ErrorKind::Server),
            (503, ErrorKind::Server),
            (504, ErrorKind::Timeout),
            (401, ErrorKind::Api),
            (418, ErrorKind::Api),
            (501, ErrorKind::Api),
        ];
        for (status, kind) in table {
            assert_eq!(OllamaError::from_response(status, "").kind(), kind, "status {status}");
        }
    }

    #[test]
    fn test_from_response_structured_error() {
        let err = OllamaError::from_response(404, r#"{"error":"model 'x' not found"}"#);
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(err.message(), "model 'x' not found");
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.payload().unwrap()["error"], "model 'x' not found");
        assert!(err.is_fallback_candidate());
    }

    #[test]
    fn test_from_response_nested_error_object() {
        let err = OllamaError::from_response(500, r#"{"error":{"message":"boom"}}"#);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    #[test]
    fn test_from_response_raw_text() {
        let err = OllamaError::from_response(502, "bad gateway\n");
        assert_eq!(err.message(), "bad gateway");
        assert_eq!(err.raw_body(), Some("bad gateway\n"));
        assert!(err.payload().is_none());
    }

    #[test]
    fn test_from_response_empty_body() {
        let err = OllamaError::from_response(429, "");
        assert_eq!(err.message(), "HTTP 429");
        assert!(err.is_rate_limited());
        assert!(err.raw_body().is_none());
    }

    #[test]
    fn test_with_model_keeps_first() {
        let err = OllamaError::new(ErrorKind::Server, "x")
            .with_model("a")
            .with_model("b");
        assert_eq!(err.model(), Some("a"));
        assert_eq!(err.to_string(), "server error: x");
    }

    #[test]
    fn test_fallback_candidates() {
        assert!(!OllamaError::new(ErrorKind::InvalidRequest, "").is_fallback_candidate());
        assert!(!OllamaError::new(ErrorKind::Timeout, "").is_fallback_candidate());
        assert!(OllamaError::new(ErrorKind::Server, "").is_fallback_candidate());
    }
}
