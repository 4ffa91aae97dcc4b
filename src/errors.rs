use std::fmt;

/// Application-specific error types.
///
/// Upstream failures are split by phase so the dispatcher can log them
/// distinctly, but both map to the same caller-facing 500: from the
/// caller's perspective a failed token exchange is an internal dependency
/// failure, never a 401.
#[derive(Debug, Clone)]
pub enum AppError {
    /// OAuth2 token exchange failed.
    UpstreamAuth(String),
    /// GraphQL call failed at the network/HTTP layer.
    UpstreamTransport(String),
    /// Internal server error.
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::UpstreamAuth(msg) => write!(f, "Upstream auth error: {}", msg),
            AppError::UpstreamTransport(msg) => write!(f, "Upstream transport error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    /// A bare `reqwest::Error` is a transport failure; the token path wraps
    /// its own errors in `UpstreamAuth` explicitly.
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamTransport(err.to_string())
    }
}
