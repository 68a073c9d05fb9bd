//! Remote failure descriptors and their translation into [`Error`] kinds.
//!
//! The transport turns whatever the wire gives it (Google error envelope,
//! plain-text body, connection failure) into a [`RemoteFault`]; operations
//! then call [`classify`] to pick the error the caller sees.

use crate::Error;
use serde::Deserialize;
use std::fmt;

/// Structured description of a failed remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFault {
    /// Numeric code (HTTP status or the envelope's `error.code`).
    pub code: Option<u16>,
    /// Canonical status string such as `RESOURCE_EXHAUSTED`.
    pub status: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RemoteFault {
    pub fn new(code: Option<u16>, status: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code,
            status: status.map(str::to_string),
            message: message.into(),
        }
    }

    /// Fault without any descriptor, e.g. a connection error or timeout.
    pub fn without_descriptor(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Convert a non-success HTTP response into a fault.
    ///
    /// Prefers the envelope's `error.code`/`error.status`; falls back to the
    /// HTTP status and the raw body when the body is not an error envelope.
    pub fn from_response(http_status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(envelope) => Self {
                code: envelope.error.code.or(Some(http_status)),
                status: envelope.error.status,
                message: envelope.error.message.unwrap_or_else(|| body.to_string()),
            },
            Err(_) => Self {
                code: Some(http_status),
                status: None,
                message: body.to_string(),
            },
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.status.as_deref()) {
            (Some(code), Some(status)) => write!(f, "{} {}: {}", code, status, self.message),
            (Some(code), None) => write!(f, "{}: {}", code, self.message),
            (None, Some(status)) => write!(f, "{}: {}", status, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Operation a fault came from; selects the generic fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generate,
    Edit,
    Segment,
}

impl Operation {
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::Generate => "Failed to generate image. Please try again.",
            Operation::Edit => "Failed to edit image. Please try again.",
            Operation::Segment => "Failed to segment image. Please try again.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Generate => "generate",
            Operation::Edit => "edit",
            Operation::Segment => "segment",
        };
        f.write_str(name)
    }
}

/// Map a remote fault to the error surfaced for `operation`.
pub fn classify(fault: &RemoteFault, operation: Operation) -> Error {
    let status = fault.status.as_deref();
    match (fault.code, status) {
        (Some(429), _) | (_, Some("RESOURCE_EXHAUSTED")) => Error::QuotaExceeded,
        (Some(400), _) | (_, Some("INVALID_ARGUMENT")) => Error::InvalidRequest,
        (Some(401), _) | (_, Some("UNAUTHENTICATED")) => Error::AuthenticationFailed,
        _ => Error::GenericFailure(operation.failure_message().to_string()),
    }
}
