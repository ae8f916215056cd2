//! Classified service failures

use serde::Deserialize;

/// Result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Status used when no HTTP response was received.
pub const TRANSPORT_STATUS: u16 = 0;

/// Failure classified by the twin-graph service
///
/// `status` is the HTTP status (or [`TRANSPORT_STATUS`]) and `error_code`
/// the service's machine-readable code, e.g. `ModelReferencesNotDeleted`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error_code} ({status}): {message}")]
pub struct ServiceError {
    /// HTTP status
    pub status: u16,
    /// Machine-readable error code
    pub error_code: String,
    /// Human-readable message
    pub message: String,
}

impl ServiceError {
    /// Create error from parts
    pub fn new(status: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    /// 400 with code
    pub fn bad_request(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(400, error_code, message)
    }

    /// 404 with code
    pub fn not_found(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(404, error_code, message)
    }

    /// 409 with code
    pub fn conflict(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(409, error_code, message)
    }

    /// Failure below HTTP (connection, timeout, decoding)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_STATUS, "TransportError", message)
    }

    /// Check if the target was absent
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Check if the call conflicted with current state
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Check if repeating the call could succeed without changes
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == TRANSPORT_STATUS || self.status == 429 || self.status >= 500
    }

    /// Decode an error response body
    ///
    /// Understands `{"error": {"code": ..., "message": ...}}`; anything else
    /// keeps the raw body as message and derives the code from the status.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: Detail,
        }

        #[derive(Deserialize)]
        struct Detail {
            code: String,
            #[serde(default)]
            message: String,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => Self::new(status, envelope.error.code, envelope.error.message),
            Err(_) => Self::new(status, status_code_name(status), body.trim()),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::new(status.as_u16(), status_code_name(status.as_u16()), err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        409 => "Conflict",
        412 => "PreconditionFailed",
        429 => "TooManyRequests",
        500..=599 => "ServiceError",
        _ => "Unknown",
    }
}
