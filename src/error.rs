use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    HttpTimeout,
    HttpStatus,
    Connect,
    InvalidResponse,
    StreamProtocol,
    Unknown,
}

impl TransportErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            TransportErrorCode::HttpStatus => "HTTP_STATUS",
            TransportErrorCode::Connect => "CONNECT",
            TransportErrorCode::InvalidResponse => "INVALID_RESPONSE",
            TransportErrorCode::StreamProtocol => "STREAM_PROTOCOL",
            TransportErrorCode::Unknown => "UNKNOWN_TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Transport {
        code: TransportErrorCode,
        endpoint: String,
        status: Option<u16>,
        message: String,
        correlation_id: Option<String>,
    },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn transport(
        code: TransportErrorCode,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::transport_with_details(code, endpoint, None, message, None)
    }

    pub fn transport_with_details(
        code: TransportErrorCode,
        endpoint: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
        correlation_id: Option<&str>,
    ) -> Self {
        let endpoint = endpoint.into();
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match (&correlation, status) {
            (Some(id), Some(status)) => {
                warn!(
                    target: "app::http::error",
                    code = %code,
                    %endpoint,
                    status,
                    correlation_id = %id,
                    %message
                );
            }
            (Some(id), None) => {
                warn!(
                    target: "app::http::error",
                    code = %code,
                    %endpoint,
                    correlation_id = %id,
                    %message
                );
            }
            (None, _) => {
                warn!(target: "app::http::error", code = %code, %endpoint, %message);
            }
        }

        AppError::Transport {
            code,
            endpoint,
            status,
            message,
            correlation_id: correlation,
        }
    }

    pub fn transport_code(&self) -> Option<TransportErrorCode> {
        match self {
            AppError::Transport { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            AppError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Transport { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::config", %message, "configuration error");
        AppError::Config(message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(error: serde_yaml::Error) -> Self {
        AppError::config(format!("invalid configuration file: {error}"))
    }
}
