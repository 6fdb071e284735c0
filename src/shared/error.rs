use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Database(String),
    /// Transport-level failure: the request never produced a response.
    Network(String),
    /// HTTP 429 after the retry budget was exhausted. `retry_after` carries the
    /// server's hint in seconds when the header was present.
    RateLimited { retry_after: Option<u64> },
    /// Any other non-2xx response the caller has to interpret.
    Api { status: u16, message: String },
    NotFound(String),
    InvalidInput(String),
    ConfigurationError(String),
    SerializationError(String),
    Internal(String),
}

impl AppError {
    /// Numeric HTTP status for response-derived errors, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::RateLimited { .. } => Some(429),
            AppError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::RateLimited { retry_after } => match retry_after {
                Some(secs) => write!(f, "Rate limited, retry after {}s", secs),
                None => write!(f, "Rate limited"),
            },
            AppError::Api { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
