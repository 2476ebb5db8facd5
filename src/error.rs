use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the synchronization engine
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Calendar authorization failed: {0}")]
    #[diagnostic(
        code(household_sync::auth),
        help("Reconnect the calendar account with the connect_calendar binary")
    )]
    Auth(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(household_sync::not_found))]
    NotFound(String),

    #[error("Calendar provider temporarily unavailable: {0}")]
    #[diagnostic(code(household_sync::transient))]
    Transient(String),

    #[error("Operation not supported by the calendar provider: {0}")]
    #[diagnostic(code(household_sync::unsupported))]
    Unsupported(String),

    #[error("Calendar provider rejected the request: {0}")]
    #[diagnostic(code(household_sync::provider))]
    Provider(String),

    #[error("Invalid event data: {0}")]
    #[diagnostic(code(household_sync::validation))]
    Validation(String),

    #[error("Local store error: {0}")]
    #[diagnostic(code(household_sync::store))]
    Store(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(household_sync::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(household_sync::config))]
    Config(String),

    #[error(transparent)]
    #[diagnostic(code(household_sync::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(household_sync::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(household_sync::other))]
    Other(String),
}

impl Error {
    /// Whether the remote object (or local record) is known to be absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the local store failed to read or write a document
    pub fn is_local(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Serialization(_))
    }

    /// Whether retrying on the next on-demand sync may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// Anything reqwest reports before a status code is available is a transport problem
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type SyncResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create authorization errors
pub fn auth_error(message: &str) -> Error {
    Error::Auth(message.to_string())
}

/// Helper to create not-found errors
pub fn not_found_error(message: &str) -> Error {
    Error::NotFound(message.to_string())
}

/// Helper to create transient provider errors
pub fn transient_error(message: &str) -> Error {
    Error::Transient(message.to_string())
}

/// Helper to create validation errors
pub fn validation_error(message: &str) -> Error {
    Error::Validation(message.to_string())
}

/// Helper to create local store errors
pub fn store_error(message: &str) -> Error {
    Error::Store(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
