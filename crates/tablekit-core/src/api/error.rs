use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized { message: Option<String> },

    #[error("Access denied: {body}")]
    AccessDenied { message: Option<String>, body: String },

    #[error("Resource not found: {body}")]
    NotFound { message: Option<String>, body: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {body}")]
    ServerError {
        status: u16,
        message: Option<String>,
        body: String,
    },

    #[error("Request rejected ({status}): {body}")]
    Rejected {
        status: u16,
        message: Option<String>,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failure bodies from the backend look like `{"success": false, "error": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull the backend's `error` field out of a failure body, if it has one
    pub fn extract_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::AccessDenied {
                message,
                body: truncated,
            },
            404 => ApiError::NotFound {
                message,
                body: truncated,
            },
            429 => ApiError::RateLimited,
            code @ 500..=599 => ApiError::ServerError {
                status: code,
                message,
                body: truncated,
            },
            code => ApiError::Rejected {
                status: code,
                message,
                body: truncated,
            },
        }
    }

    /// The human-readable `error` the backend put in the failure body
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::AccessDenied { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::ServerError { message, .. }
            | ApiError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failed response, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::AccessDenied { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::ServerError { status, .. } | ApiError::Rejected { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidResponse(_) => None,
        }
    }
}
