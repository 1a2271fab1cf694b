//! Error taxonomy for API calls

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::ApiResponse;

/// Failure below HTTP: the request never produced a status line.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Field-level validation failure reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    #[serde(default)]
    pub value: serde_json::Value,
    pub message: String,
}

/// Error body: `{success, message, data?: [ValidationError]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Best-effort parse; anything unreadable yields an empty body.
    pub fn from_response(resp: &ApiResponse) -> Self {
        serde_json::from_slice(&resp.body).unwrap_or_default()
    }

    /// `data` as field errors, when it has that shape.
    pub fn validation_errors(&self) -> Vec<ValidationError> {
        self.data
            .clone()
            .and_then(|d| serde_json::from_value(d).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("authentication required: {message}")]
    Unauthorized { message: String },

    #[error("HTTP {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        validation: Vec<ValidationError>,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A path segment that can't address a single resource.
    #[error("invalid resource id: {0:?}")]
    InvalidId(String),
}

impl ApiError {
    /// Classify a non-2xx response.
    pub fn from_response(resp: &ApiResponse) -> Self {
        let body = ErrorBody::from_response(resp);
        let validation = body.validation_errors();
        let message = body.message.unwrap_or_else(|| {
            let reason = resp.status.canonical_reason().unwrap_or("unknown status");
            format!("API error: {}", reason)
        });

        if resp.is_unauthorized() {
            Self::Unauthorized { message }
        } else {
            Self::Status {
                status: resp.status,
                message,
                validation,
            }
        }
    }

    /// Connection failures and timeouts may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Status { validation, .. } => validation,
            _ => &[],
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Timeout(_) => Some(StatusCode::REQUEST_TIMEOUT),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
