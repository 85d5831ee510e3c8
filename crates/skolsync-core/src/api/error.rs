use thiserror::Error;

/// Failure taxonomy for the remote school platform collaborator.
///
/// Implementations of [`super::SchoolApi`] may return any `anyhow::Error`,
/// but errors built from this enum keep their variant name when projected
/// into [`crate::state::ErrorInfo`]. This crate ships no transport and only
/// raises `NotLoggedIn` itself (from `FakeApi`); the other variants and
/// [`ApiError::from_status`] are for HTTP-backed implementations.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Unauthorized - session may have expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data around
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    /// Map an HTTP status and body, as reported by a transport, to an error.
    ///
    /// Helper for `SchoolApi` implementations that speak HTTP. Bodies are
    /// truncated to 500 bytes on a char boundary.
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 | 403 => ApiError::Unauthorized,
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Stable name of the variant, used as `ErrorInfo::name`.
    pub fn name(&self) -> &'static str {
        match self {
            ApiError::NotLoggedIn => "NotLoggedIn",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::NotFound(_) => "NotFound",
            ApiError::ServerError(_) => "ServerError",
            ApiError::NetworkError(_) => "NetworkError",
            ApiError::InvalidResponse(_) => "InvalidResponse",
        }
    }
}
