//! Error types for zonesync
//!
//! The variants follow the reconciliation failure classes: audit violations,
//! fetch failures, unsupported transformations and execution failures, plus
//! the configuration and provider plumbing errors around them.

use thiserror::Error;

/// Result type alias for zonesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for zonesync
#[derive(Error, Debug)]
pub enum Error {
    /// The desired record set violates provider constraints.
    /// Holds every violation found, never only the first one.
    #[error("Audit failed with {} violation(s): {}", .0.len(), .0.join("; "))]
    Audit(Vec<String>),

    /// Actual state could not be fetched or mapped into the record model
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// One or more records have no mapping to the provider's native format
    #[error("Unsupported transformation: {}", .0.join("; "))]
    Unsupported(Vec<String>),

    /// A correction failed while being applied
    #[error("Execution failed after {applied} applied correction(s): {message}")]
    Execution {
        /// Corrections applied before the failure
        applied: usize,
        /// Error reported by the failing correction
        message: String,
    },

    /// A provider was asked to do something it declared it cannot do
    #[error("Capability error: {0}")]
    Capability(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create an unsupported-transformation error for a single record
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(vec![msg.into()])
    }

    /// Create a capability error
    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before any network mutation happened.
    ///
    /// Audit, fetch, construction and configuration failures all stop a zone
    /// before its first correction runs.
    pub fn is_pre_mutation(&self) -> bool {
        !matches!(self, Self::Execution { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
