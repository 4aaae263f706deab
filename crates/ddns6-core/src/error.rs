//! Error types for ddns6
//!
//! Errors fall into two classes that drive the retry policy:
//!
//! - **Transient**: discovery failures, timeouts, provider network/API failures.
//!   The [`RetryScheduler`](crate::retry::RetryScheduler) absorbs these.
//! - **Configuration**: a missing or unparsable DNS record, rejected credentials,
//!   invalid configuration. Retrying cannot fix these, so they propagate
//!   immediately and halt the affected pipeline.

use crate::address::AddressFamily;
use thiserror::Error;

/// Result type alias for ddns6 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ddns6
#[derive(Error, Debug)]
pub enum Error {
    /// Address discovery failed (probe, dial, protocol or OS query)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Discovery completed but no qualifying address exists
    #[error("No qualifying {0} address found")]
    NoAddressFound(AddressFamily),

    /// The reconciler was handed an empty address set
    #[error("Discovery produced an empty address set")]
    EmptyDiscovery,

    /// The target record does not exist at the provider
    #[error("DNS record not found: {name} (type: {record_type})")]
    RecordNotFound {
        /// Record name
        name: String,
        /// Record type (A or AAAA)
        record_type: String,
    },

    /// The provider's record content is not an address
    #[error("Record {name} has unparsable content {content:?}: {reason}")]
    RecordParse {
        /// Record name
        name: String,
        /// Raw record content
        content: String,
        /// Parser message
        reason: String,
    },

    /// Transient provider failure
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Credential rejected by the provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single attempt ran past its time bound
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The retry deadline passed before any attempt completed
    #[error("Cycle deadline exceeded")]
    DeadlineExceeded,

    /// Shutdown was requested
    #[error("Cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "record not found" error
    pub fn record_not_found(name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self::RecordNotFound {
            name: name.into(),
            record_type: record_type.into(),
        }
    }

    /// Create a record content parse error
    pub fn record_parse(
        name: impl Into<String>,
        content: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::RecordParse {
            name: name.into(),
            content: content.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same attempt can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Discovery(_)
            | Self::NoAddressFound(_)
            | Self::EmptyDiscovery
            | Self::Provider { .. }
            | Self::Http(_)
            | Self::Network(_)
            | Self::Json(_)
            | Self::Timeout(_)
            | Self::Other(_) => true,
            Self::RecordNotFound { .. }
            | Self::RecordParse { .. }
            | Self::Authentication(_)
            | Self::Config(_)
            | Self::DeadlineExceeded
            | Self::Cancelled => false,
        }
    }

    /// Whether this error means the pipeline cannot make progress until an
    /// operator fixes something
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound { .. }
                | Self::RecordParse { .. }
                | Self::Authentication(_)
                | Self::Config(_)
        )
    }
}
