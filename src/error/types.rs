//! Error type definitions and conversions

use super::{AppError, ModelError};

// Implement From traits for common error types
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            operation: "io_operation".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigParse {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization {
            message: format!("CSV: {err}"),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        Self::HttpClient {
            message: err.to_string(),
            status_code,
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::config_validation(format!("Invalid URL: {err}"), Some("api_base"))
    }
}

impl From<tempfile::PersistError> for AppError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::CachePersistence {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::DeadlineExceeded(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, AppError::Io { .. }));
        assert!(!err.is_setup_fatal());
    }

    #[test]
    fn test_model_error_classification() {
        assert!(ModelError::ResourceExhausted("quota".into()).is_transient());
        assert!(ModelError::MalformedResponse("empty".into()).is_transient());
        assert!(!ModelError::PermissionDenied("bad key".into()).is_transient());
        assert!(ModelError::PermissionDenied("bad key".into()).is_authorization());
        assert!(!ModelError::Other("boom".into()).is_transient());
        assert!(!ModelError::Other("boom".into()).is_authorization());
    }

    #[test]
    fn test_fatal_taxonomy() {
        assert!(AppError::NoKeysConfigured.is_setup_fatal());
        assert!(AppError::KeysExhausted.is_run_fatal());
        assert!(!AppError::internal("x").is_run_fatal());
    }
}
