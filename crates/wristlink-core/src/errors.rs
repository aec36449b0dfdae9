//! Error types for the Wristlink protocol
//!
//! This module contains the error types used throughout the core crate:
//! decode errors raised at the wire boundary, transport and collaborator
//! failures, and the `WristlinkError` type that unifies them.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// What was wrong with a content key during decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeProblem {
    /// The key was absent
    Missing,
    /// The key was present with a different value type
    WrongType { expected: &'static str },
    /// The value had the right type but an unacceptable value
    Invalid { reason: String },
}

impl core::fmt::Display for DecodeProblem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeProblem::Missing => write!(f, "missing"),
            DecodeProblem::WrongType { expected } => write!(f, "expected {}", expected),
            DecodeProblem::Invalid { reason } => write!(f, "invalid: {}", reason),
        }
    }
}

/// Failure to turn a wire message into a typed request or response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode '{identifier}': key '{key}' {problem}")]
pub struct DecodeError {
    /// Identifier of the message being decoded
    pub identifier: String,
    /// Content key that failed
    pub key: String,
    /// What went wrong with it
    pub problem: DecodeProblem,
}

impl DecodeError {
    pub fn missing(identifier: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            key: key.into(),
            problem: DecodeProblem::Missing,
        }
    }

    pub fn wrong_type(
        identifier: impl Into<String>,
        key: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            key: key.into(),
            problem: DecodeProblem::WrongType { expected },
        }
    }

    pub fn invalid(
        identifier: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            key: key.into(),
            problem: DecodeProblem::Invalid {
                reason: reason.into(),
            },
        }
    }
}

/// Paired-device transport failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Paired device is not reachable")]
    NotReachable,
    #[error("Transport closed: {reason}")]
    Closed { reason: String },
    #[error("Reply channel dropped before a reply was sent for '{identifier}'")]
    ReplyDropped { identifier: String },
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Cannot frame '{identifier}': {reason}")]
    Frame { identifier: String, reason: String },
}

/// Failures reported by the home server collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Service call {domain}.{service} rejected: {reason}")]
    Rejected {
        domain: String,
        service: String,
        reason: String,
    },
}

/// Failures seen by the watch-side client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Phone is not reachable")]
    NotReachable,

    #[error("Unexpected reply '{reply}' to {request}")]
    UnexpectedReply {
        request: crate::identifiers::RequestIdentifier,
        reply: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cannot encode request: {0}")]
    Encode(#[from] WristlinkError),
}

// ----------------------------------------------------------------------------
// Top-level Error
// ----------------------------------------------------------------------------

/// Core error type for the Wristlink protocol
#[derive(Debug, Error)]
pub enum WristlinkError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A typed value has no wire representation
    #[error("Encoding error: {reason}")]
    Encoding { reason: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Channel communication error between runtime tasks
    #[error("Channel error: {message}")]
    Channel { message: String },
}

impl WristlinkError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        WristlinkError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an encoding error with a reason
    pub fn encoding_error<T: Into<String>>(reason: T) -> Self {
        WristlinkError::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        WristlinkError::Channel {
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, WristlinkError>;
