//! Error types and failure normalization.
//!
//! # Design
//! Internally every failure is an `ApiError` carrying as much detail as the
//! layer that produced it had. Callers never see it: completion callbacks
//! receive a `Failure`, the uniform `(status, message)` pair produced by
//! `ApiError::into_failure`. A missing network response is folded into the
//! `-1` sentinel regardless of its cause.

use crate::transport::TransportError;

/// Status reported when no network response was received.
pub const NO_RESPONSE_STATUS: i32 = -1;

/// Message reported when the response carried no usable body.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred.";

/// Terminal result of a request as seen by the caller.
pub type Outcome<T> = Result<T, Failure>;

/// The failure branch of an `Outcome`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error ({status}): {message}")]
pub struct Failure {
    pub status: i32,
    pub message: String,
}

impl Failure {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn no_response() -> Self {
        Self::new(NO_RESPONSE_STATUS, UNKNOWN_ERROR_MESSAGE)
    }

    /// Whether the server answered at all.
    pub fn has_response(&self) -> bool {
        self.status != NO_RESPONSE_STATUS
    }
}

/// Everything that can go wrong between building a request and decoding
/// its response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}")]
    HttpError { status: u16, body: Vec<u8> },

    /// A successful response body did not match the expected shape.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The response declared a charset that cannot be decoded.
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// The dispatch queue could not be started.
    #[error("request queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl ApiError {
    pub fn into_failure(self) -> Failure {
        match self {
            ApiError::Transport(_) => Failure::no_response(),
            ApiError::HttpError { status, body } => {
                let message = if body.is_empty() {
                    UNKNOWN_ERROR_MESSAGE.to_string()
                } else {
                    String::from_utf8_lossy(&body).into_owned()
                };
                Failure::new(i32::from(status), message)
            }
            ApiError::DeserializationError(_) => Failure::no_response(),
            err @ (ApiError::SerializationError(_)
            | ApiError::EncodingError(_)
            | ApiError::QueueUnavailable(_)) => {
                Failure::new(NO_RESPONSE_STATUS, err.to_string())
            }
        }
    }
}

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        err.into_failure()
    }
}
