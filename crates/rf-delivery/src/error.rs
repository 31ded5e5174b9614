//! Error types for batch delivery processing

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery processing errors
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Unsupported channel conversion {from} -> {to} for {path}")]
    ChannelConversion {
        path: String,
        from: usize,
        to: usize,
    },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Error classification used in the end-of-run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DecodeError,
    ChannelConversionError,
    EncodeError,
    PolicyViolation,
    Config,
    Io,
    Cancelled,
}

impl DeliveryError {
    /// Report classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputNotFound(_) | Self::Decode(_) => ErrorKind::DecodeError,
            Self::ChannelConversion { .. } => ErrorKind::ChannelConversionError,
            Self::Encode(_) => ErrorKind::EncodeError,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::InvalidConfig(_) | Self::Json(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Structural errors abort the whole batch; everything else is per file
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PolicyViolation(_) | Self::InvalidConfig(_))
    }
}
