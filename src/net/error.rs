//! API client error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! - Transport failures propagate unclassified.
//! - Non-success responses carry the service's JSON envelope verbatim
//!   (`{"code": "...", "error": "..."}`) so callers can match on `code`.
//! - Bodies that are not JSON surface as decode failures.
//!
//! Nothing here retries. Only the token-invalidation codes trigger a side
//! effect (sign-out), and that happens in the client before the error is
//! returned.

use serde_json::Value;

/// Error codes meaning the bearer token must be discarded.
pub const TOKEN_INVALIDATION_CODES: [&str; 2] = ["token-expired", "token-invalid"];

#[must_use]
pub fn is_token_invalidation_code(code: &str) -> bool {
    TOKEN_INVALIDATION_CODES.contains(&code)
}

/// Errors produced by [`super::api::ApiClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (DNS, connection refused, ...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status and a JSON envelope.
    #[error("service returned {status}: {}", describe_envelope(.body))]
    Api { status: u16, body: Value },

    /// The response body was not JSON, or not the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The endpoint path could not be joined onto the base URL.
    #[error("invalid request URL: {0}")]
    Url(String),

    /// A local document could not be read for upload.
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status of an application error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed error envelope of an application error.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Machine-readable `code` of an application error.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.body().and_then(envelope_code)
    }

    /// Human-readable message of an application error: the envelope's
    /// `error` field, else `message`.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body().and_then(envelope_message)
    }

    /// Whether this error made the client sign the session out.
    #[must_use]
    pub fn is_token_invalidation(&self) -> bool {
        self.code().is_some_and(is_token_invalidation_code)
    }
}

pub(crate) fn envelope_code(body: &Value) -> Option<&str> {
    body.get("code").and_then(Value::as_str)
}

fn envelope_message(body: &Value) -> Option<&str> {
    body.get("error")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
}

fn describe_envelope(body: &Value) -> String {
    match (envelope_code(body), envelope_message(body)) {
        (Some(code), Some(message)) => format!("{message} ({code})"),
        (Some(code), None) => code.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => body.to_string(),
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
