//! Directory engine error types
//!
//! Error definitions with client/server classification so the HTTP layer can
//! pick a precise status code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The constraint an attribute value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "limit")]
pub enum RangeBound {
    /// Value (or length) is below the declared `rangeLower`.
    Lower(i64),
    /// Value (or length) is above the declared `rangeUpper`.
    Upper(i64),
    /// More than one value was supplied for a single-valued attribute.
    SingleValued,
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Lower(limit) => write!(f, "lower bound {limit}"),
            RangeBound::Upper(limit) => write!(f, "upper bound {limit}"),
            RangeBound::SingleValued => write!(f, "single-valued"),
        }
    }
}

/// Error that can occur while building, validating or executing directory
/// requests.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Attribute is not present in the schema catalog.
    #[error("unknown attribute '{attribute}'")]
    UnknownAttribute { attribute: String },

    /// Attribute value violates a schema range constraint.
    #[error("value for '{attribute}' violates {bound} (got {actual})")]
    ValueOutOfRange {
        attribute: String,
        bound: RangeBound,
        actual: i64,
    },

    /// Structured filter input could not be parsed, or a negation wraps a
    /// compound statement.
    #[error("malformed filter: {message}")]
    MalformedFilter { message: String },

    /// Raw value does not match the shape expected for its declared type.
    #[error("conversion failed for attribute '{attribute}': {message}")]
    ConversionFailure { attribute: String, message: String },

    /// Failure reported by the transport collaborator, passed through as-is.
    #[error("transport failure{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    TransportFailure {
        code: Option<u32>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No connection or schema is registered for the requested domain key.
    #[error("domain not found: {domain}")]
    DomainNotFound { domain: String },

    /// Engine configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl DirectoryError {
    /// Check if the error was caused by the caller's input (4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DirectoryError::UnknownAttribute { .. }
                | DirectoryError::ValueOutOfRange { .. }
                | DirectoryError::MalformedFilter { .. }
                | DirectoryError::ConversionFailure { .. }
                | DirectoryError::DomainNotFound { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            DirectoryError::ValueOutOfRange { .. } => "VALUE_OUT_OF_RANGE",
            DirectoryError::MalformedFilter { .. } => "MALFORMED_FILTER",
            DirectoryError::ConversionFailure { .. } => "CONVERSION_FAILURE",
            DirectoryError::TransportFailure { .. } => "TRANSPORT_FAILURE",
            DirectoryError::DomainNotFound { .. } => "DOMAIN_NOT_FOUND",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
        }
    }

    /// The attribute this error is attributed to, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            DirectoryError::UnknownAttribute { attribute }
            | DirectoryError::ValueOutOfRange { attribute, .. }
            | DirectoryError::ConversionFailure { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    // Convenience constructors

    /// Create a malformed filter error.
    pub fn malformed(message: impl Into<String>) -> Self {
        DirectoryError::MalformedFilter {
            message: message.into(),
        }
    }

    /// Create a conversion failure for an attribute.
    pub fn conversion(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::ConversionFailure {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a transport failure without a protocol result code.
    pub fn transport(message: impl Into<String>) -> Self {
        DirectoryError::TransportFailure {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport failure carrying the protocol result code.
    pub fn transport_with_code(code: u32, message: impl Into<String>) -> Self {
        DirectoryError::TransportFailure {
            code: Some(code),
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport failure with source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::TransportFailure {
            code: None,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory engine operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
