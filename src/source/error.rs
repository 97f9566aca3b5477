//! Source-specific error types.
//!
//! This module provides structured error types for distribution-source
//! operations, so callers can tell a misbehaving backend apart from a
//! deliberately disabled one and react accordingly.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while talking to a distribution source.
///
/// A `Protocol` error means the backend answered but not usefully (non-2xx
/// status or a payload we could not parse); the resolution registry treats
/// it as "this source found nothing" rather than failing the whole
/// resolution. `Disabled` is fatal to the individual call only.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Operation attempted against an administratively disabled source
    #[error("Source '{name}' is disabled")]
    Disabled { name: String },

    /// Backend returned a non-2xx status or an unusable payload
    #[error("Source protocol error ({status}): {body}")]
    Protocol { status: u16, body: String },

    /// Payload arrived but could not be decoded into the common model
    #[error("Malformed payload from source: {message}")]
    Malformed { message: String },

    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local filesystem error while scanning or writing the source layout
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error shared by every caller coalesced onto one in-flight request
    #[error(transparent)]
    Coalesced(#[from] Arc<SourceError>),
}

impl SourceError {
    /// Create a disabled-source error
    pub fn disabled(source: impl Into<String>) -> Self {
        Self::Disabled {
            name: source.into(),
        }
    }

    /// Create a protocol error from a status code and response body
    pub fn protocol(status: u16, body: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// True when the error only means "nothing usable from this source",
    /// which the registry downgrades to an empty result during fan-out.
    pub fn is_soft(&self) -> bool {
        match self {
            Self::Disabled { .. }
            | Self::Protocol { .. }
            | Self::Malformed { .. }
            | Self::Network(_) => true,
            Self::Io(_) => false,
            Self::Coalesced(inner) => inner.is_soft(),
        }
    }
}

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;
