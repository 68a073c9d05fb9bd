//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. The first
//! group of variants is what callers of the client see; remote failures are
//! always translated into one of them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("API key is not configured. Set GEMINI_API_KEY to a valid key.")]
    NotConfigured,

    #[error("The provided API key is invalid or was rejected.")]
    InvalidCredential,

    #[error("API quota exceeded. Please check your plan and billing details, or try again later.")]
    QuotaExceeded,

    #[error("The request was rejected as invalid. Check the prompt and images and try again.")]
    InvalidRequest,

    #[error("Authentication failed. Please check that your API key is valid.")]
    AuthenticationFailed,

    #[error("Malformed response from model: {message}")]
    MalformedResponse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    GenericFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedResponse {
            message: message.into(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
