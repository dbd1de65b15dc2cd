//! QuorumKV Error Types

use thiserror::Error;

/// Result type alias for QuorumKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// QuorumKV error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    // Client input errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::MissingParameter(_) => "MISSING_PARAMETER",
            Error::KeyNotFound(_) => "KEY_NOT_FOUND",
            Error::Config(_) | Error::ConfigParse(_) | Error::ConfigRender(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidRequest("empty key".into()).code(), "INVALID_REQUEST");
        assert_eq!(Error::KeyNotFound("a".into()).code(), "KEY_NOT_FOUND");
        assert_eq!(Error::Config("bad".into()).code(), "CONFIG_ERROR");
        assert_eq!(Error::Network("refused".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_missing_parameter_message() {
        let err = Error::MissingParameter("key");
        assert_eq!(err.to_string(), "key parameter is required");
        assert_eq!(err.code(), "MISSING_PARAMETER");
    }
}
