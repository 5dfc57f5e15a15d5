use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    ValidationError(String),
    ParseError(String),
    TransportError(String),
    ApiError { status: u16, message: String },
    ConfigError(String),
    IoError(String),
}

impl AppError {
    /// Message suitable for a banner: the server's own text for API
    /// errors, the bare detail for everything else.
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::ValidationError(msg)
            | AppError::ParseError(msg)
            | AppError::TransportError(msg)
            | AppError::ConfigError(msg)
            | AppError::IoError(msg) => msg,
            AppError::ApiError { message, .. } => message,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::ValidationError(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::TransportError(msg) => write!(f, "Transport error: {}", msg),
            AppError::ApiError { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::TransportError(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            AppError::ParseError(format!("Failed to decode response: {}", err))
        } else {
            AppError::TransportError(format!("Request failed: {}", err))
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|list| list.iter())
            .filter_map(|error| error.message.as_ref().map(|m| m.to_string()))
            .next()
            .unwrap_or_else(|| errors.to_string());
        AppError::ValidationError(message)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
