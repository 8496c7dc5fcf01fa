//! Error types for chandl

use std::time::Duration;
use thiserror::Error;

/// Main error type for chandl operations
#[derive(Debug, Error)]
pub enum ChandlError {
    #[error("Transfer failed for {url}: {reason}")]
    Transfer { url: String, reason: String },

    #[error("No matching release asset: {0}")]
    Resolution(String),

    #[error("Archive extraction failed: {0}")]
    Extraction(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid {field} filter bound: {value:?}")]
    FilterParse { field: &'static str, value: String },

    #[error("{label} timed out after {}s", .timeout.as_secs())]
    SubprocessTimeout { label: String, timeout: Duration },

    #[error("{label} failed: {message}")]
    SubprocessFailure { label: String, message: String },

    #[error("API key is not configured")]
    MissingCredential,

    #[error("Nothing selected: {0}")]
    MissingSelection(String),

    #[error("Invalid channel URL: {0}")]
    InvalidChannelUrl(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl ChandlError {
    /// Build a transfer error for the given URL
    pub fn transfer(url: impl Into<String>, reason: impl ToString) -> Self {
        ChandlError::Transfer {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the error came from moving bytes over the network
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, ChandlError::Transfer { .. } | ChandlError::Http(_))
    }

    /// Check if the error should block an action before it starts
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            ChandlError::MissingCredential
                | ChandlError::MissingSelection(_)
                | ChandlError::InvalidChannelUrl(_)
        )
    }

    /// Check if the error came out of an external tool invocation
    pub fn is_subprocess_error(&self) -> bool {
        matches!(
            self,
            ChandlError::SubprocessTimeout { .. } | ChandlError::SubprocessFailure { .. }
        )
    }
}
