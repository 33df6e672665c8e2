use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up logging or loading configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read, merged or deserialized
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
