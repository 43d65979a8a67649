//! Error types for endpoint bindings.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use endpoint_binding::{Error, Result};
//!
//! fn example(manager: &ConnectionManager<ExchangeFactory>) -> Result<()> {
//!     manager.send("//chan-A", Payload::text("ON"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Parse`], [`Error::InvalidEndpoint`] |
//! | Lifecycle | [`Error::NotInitialized`], [`Error::UnknownEndpoint`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::NoConsumer`], [`Error::Unsupported`] |
//! | Transformation | [`Error::Transformation`] |
//! | State | [`Error::InvalidState`] |
//! | External | [`Error::Json`], [`Error::Regex`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when binding options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Malformed binding directive.
    ///
    /// Returned by the directive parser. Other items keep loading.
    #[error("Invalid binding configuration for item '{item}': {message}")]
    Parse {
        /// Item whose configuration failed to parse.
        item: String,
        /// Description of the parse failure.
        message: String,
    },

    /// Endpoint name not accepted by the transport kind.
    #[error("Invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The rejected endpoint name.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Manager used outside an `init()` / `release()` bracket.
    #[error("Connection manager is not initialized")]
    NotInitialized,

    /// No live connection exists for the endpoint.
    #[error("No connection for endpoint: {endpoint}")]
    UnknownEndpoint {
        /// The endpoint that was looked up.
        endpoint: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport handle closed or never opened.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Exchange channel has no bound consumer.
    #[error("No consumer bound to channel: {channel}")]
    NoConsumer {
        /// The channel without consumer.
        channel: String,
    },

    /// Operation not supported by the transport role.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    // ========================================================================
    // Transformation Errors
    // ========================================================================
    /// Transformation failed or was misconfigured.
    #[error("Transformation error: {message}")]
    Transformation {
        /// Description of the transformation failure.
        message: String,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Text could not be parsed as the requested state type.
    #[error("Cannot parse '{value}' as {expected}")]
    InvalidState {
        /// The rejected text.
        value: String,
        /// Name of the expected state type.
        expected: &'static str,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regular expression error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a directive parse error.
    #[inline]
    pub fn parse(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown endpoint error.
    #[inline]
    pub fn unknown_endpoint(endpoint: impl Into<String>) -> Self {
        Self::UnknownEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a no-consumer error.
    #[inline]
    pub fn no_consumer(channel: impl Into<String>) -> Self {
        Self::NoConsumer {
            channel: channel.into(),
        }
    }

    /// Creates an unsupported operation error.
    #[inline]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a transformation error.
    #[inline]
    pub fn transformation(message: impl Into<String>) -> Self {
        Self::Transformation {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(value: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidState {
            value: value.into(),
            expected,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::NoConsumer { .. }
                | Self::Unsupported { .. }
        )
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Parse { .. } | Self::InvalidEndpoint { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_parse_error_display() {
        let err = Error::parse("Light", "missing endpoint");
        assert_eq!(
            err.to_string(),
            "Invalid binding configuration for item 'Light': missing endpoint"
        );
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state("maybe", "OnOff");
        assert_eq!(err.to_string(), "Cannot parse 'maybe' as OnOff");
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::ConnectionClosed.is_transport_error());
        assert!(Error::no_consumer("//a").is_transport_error());
        assert!(!Error::NotInitialized.is_transport_error());
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::config("bad").is_config_error());
        assert!(Error::invalid_endpoint("x", "no scheme").is_config_error());
        assert!(!Error::ConnectionClosed.is_config_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_regex_error() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let err: Error = regex_err.into();
        assert!(matches!(err, Error::Regex(_)));
        assert!(!err.is_config_error());
    }
}
