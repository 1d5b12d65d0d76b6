use std::{fmt, io};

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for batch export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Malformed or inverted date range, or a non-positive batch size.
    InvalidRange(String),

    /// Merge requested for a product with no registered merge configuration.
    UnknownProduct {
        product: String,
        available: Vec<String>,
    },

    /// Failure reported by the query executor.
    Executor(ExecutorError),

    /// Orchestrator operation invoked from a stage that does not allow it.
    InvalidTransition { from: String, action: String },

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Export ended early; its message has already been shown to the user.
    Stopped { stage: String },

    /// Generic error with a free-form message.
    Generic(String),
}

/// Failures surfaced by a query executor.
#[derive(Debug)]
pub enum ExecutorError {
    /// Database unreachable or connection dropped. Transient.
    ConnectionFailed(String),

    /// Malformed query or parameters. Not retryable.
    QueryFailed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ExecutorError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::ConnectionFailed(_))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::InvalidRange(msg) => write!(f, "Invalid date range: {msg}"),
            ExportError::UnknownProduct { product, available } => write!(
                f,
                "Invalid product: {product}. Available: {}",
                available.join(", ")
            ),
            ExportError::Executor(e) => write!(f, "Executor error: {e}"),
            ExportError::InvalidTransition { from, action } => {
                write!(f, "Cannot {action} while export is in stage '{from}'")
            }
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Stopped { stage } => write!(f, "Export stopped in stage '{stage}'"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            ExecutorError::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Executor(e) => Some(e),
            ExportError::Config(e) => Some(e),
            ExportError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ExecutorError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<ExecutorError> for ExportError {
    fn from(err: ExecutorError) -> Self {
        ExportError::Executor(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}
