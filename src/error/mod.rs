//! Error handling module
//!
//! This module provides the error taxonomy for a translation run:
//! - `AppError` for setup and run-fatal conditions plus I/O and parsing failures
//! - `ModelError` for classified failures of a single model call
//! - `Halt` for the cooperative interrupts that unwind a file early

pub mod types;

use thiserror::Error;
use tracing::{error, warn};

/// Main application error type with comprehensive categorization
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    #[error("Input directory not found: {path}")]
    InputNotFound { path: String },

    // Key management
    #[error("No API keys found. Provide them with --api, GEMINI_L10N_API_KEYS or api_key.txt")]
    NoKeysConfigured,

    #[error("All API keys are blacklisted, no usable key remains")]
    KeysExhausted,

    #[error("Key rotation failed: {message}")]
    KeyRotation { message: String },

    // Model client
    #[error("Model client error: {0}")]
    Model(#[from] ModelError),

    // Files and formats
    #[error("Failed to parse {format} file '{path}': {message}")]
    FormatParse {
        format: &'static str,
        path: String,
        message: String,
    },

    #[error("Cache persistence failed: {message}")]
    CachePersistence { message: String },

    // External service errors
    #[error("HTTP client error: {message}")]
    HttpClient { message: String, status_code: Option<u16> },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a new configuration validation error
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    /// Create a new internal error with context
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Setup-fatal errors abort before any work is attempted.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation { .. }
                | Self::ConfigParse { .. }
                | Self::InputNotFound { .. }
                | Self::NoKeysConfigured
        )
    }

    /// Run-fatal errors abort the whole run after cache and stats are persisted.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::KeysExhausted | Self::KeyRotation { .. })
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        if self.is_setup_fatal() || self.is_run_fatal() {
            error!(error = %self, "Fatal error");
        } else {
            warn!(error = %self, "Recoverable error");
        }
    }
}

/// Classified failure of a single model call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("unknown upstream error: {0}")]
    Unknown(String),

    #[error("invalid or empty response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ModelError {
    /// Failures worth retrying locally and counting toward the major-failure threshold.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted(_)
                | Self::DeadlineExceeded(_)
                | Self::ServiceUnavailable(_)
                | Self::Internal(_)
                | Self::Unknown(_)
                | Self::MalformedResponse(_)
        )
    }

    /// Invalid or revoked credential: never retried, the key gets blacklisted.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Cooperative interrupt or fatal condition that ends the current unit early.
#[derive(Debug)]
pub enum Halt {
    /// The operator asked to skip the current file.
    SkipFile,
    /// The run cannot continue.
    Fatal(AppError),
}

impl From<AppError> for Halt {
    fn from(err: AppError) -> Self {
        Self::Fatal(err)
    }
}

/// Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
