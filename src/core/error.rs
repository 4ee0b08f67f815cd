use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    /// Function-specific errors (bad status, invalid request, etc)
    #[error("API error: {0}")]
    ApiError(String),
    /// Authentication-specific errors
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// The backend refused the request because of its own rate limit
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Stream-related errors
    #[error("Stream error: {0}")]
    StreamError(String),
    /// No chunk arrived within the idle window
    #[error("No data received for {0:?}")]
    Timeout(Duration),
    /// The caller abandoned the response
    #[error("Response cancelled")]
    Cancelled,
    /// The local daily quota for a tool is used up
    #[error("Daily limit of {limit} messages reached for {tool}")]
    UsageLimit { tool: String, limit: u32 },
    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IOError(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        // If the error has a status code, map it to a more specific error
        if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => Self::Authentication(format!("Authentication failed: {err}")),
                429 => Self::RateLimited(format!("Rate limit exceeded: {err}")),
                500..=599 => Self::ServerError(format!("Server error: {err}")),
                _ => Self::Network(err),
            }
        } else {
            Self::Network(err)
        }
    }
}
