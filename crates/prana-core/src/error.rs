//! Error types for prana-core.
//!
//! # Propagation
//!
//! | Error | Session effect | Notes |
//! |-------|----------------|-------|
//! | [`Error::ConnectFailed`] | none (no link was stored) | Device unreachable or setup failed |
//! | [`Error::Transport`] | link invalidated | Write failure or disconnect mid-exchange |
//! | [`Error::CommandFailed`] | link invalidated | A set command could not be written |
//! | [`Error::RequestTimeout`] | link invalidated | No frame within the response timeout |
//! | [`Error::MalformedFrame`] | none | The link is healthy, the data was bad |
//! | [`Error::UnsupportedValue`] | none | Caller asked for a key missing from a command table |
//! | [`Error::ShuttingDown`] | none | The session was shut down |
//!
//! Invalidated links are re-established transparently on the next
//! operation. Nothing is retried inside the session.

use std::time::Duration;

use thiserror::Error;

use prana_types::ParseError;

/// Errors that can occur when talking to a Prana device.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error outside an established session.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device lookup failed.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Establishing the session failed.
    #[error("Connection to {address} failed: {reason}")]
    ConnectFailed {
        /// Address of the device.
        address: String,
        /// Why the connection could not be established.
        reason: String,
    },

    /// Write or notification failure on an established link.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A set command could not be delivered.
    #[error("Command [{command}] failed: {reason}")]
    CommandFailed {
        /// The command payload, hex formatted.
        command: String,
        /// The underlying failure.
        reason: String,
    },

    /// No state frame arrived in time.
    #[error("No state frame received within {0:?}")]
    RequestTimeout(Duration),

    /// A frame was received but could not be decoded.
    #[error("Malformed state frame: {0}")]
    MalformedFrame(ParseError),

    /// A command table has no entry for the requested key.
    #[error("{0}")]
    UnsupportedValue(ParseError),

    /// The operation was aborted by [`Session::shutdown`](crate::Session::shutdown).
    #[error("Session is shutting down")]
    ShuttingDown,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with the given address is not known to the adapter.
    NotFound { address: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { address } => write!(f, "device '{}' not found", address),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for an address.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            address: address.into(),
        })
    }

    /// Create a connection failure.
    pub fn connect_failed(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this failure tears down the current link.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::CommandFailed { .. } | Self::RequestTimeout(_)
        )
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        if err.is_malformed_frame() {
            Error::MalformedFrame(err)
        } else {
            Error::UnsupportedValue(err)
        }
    }
}

/// Result type alias using prana-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::connect_failed("AA:BB", "out of range");
        assert_eq!(err.to_string(), "Connection to AA:BB failed: out of range");

        let err = Error::RequestTimeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));

        assert_eq!(Error::ShuttingDown.to_string(), "Session is shutting down");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::FrameTooShort {
            expected: 100,
            actual: 3,
        }
        .into();
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert!(!err.invalidates_session());

        let err: Error = ParseError::unsupported("brightness", 9).into();
        assert!(matches!(err, Error::UnsupportedValue(_)));
        assert_eq!(err.to_string(), "Unsupported brightness value: 9");
    }

    #[test]
    fn test_invalidation_classification() {
        assert!(Error::transport("write failed").invalidates_session());
        assert!(Error::RequestTimeout(Duration::from_secs(5)).invalidates_session());
        assert!(
            Error::CommandFailed {
                command: "BE EF 04 0A".into(),
                reason: "gone".into()
            }
            .invalidates_session()
        );
        assert!(!Error::ShuttingDown.invalidates_session());
        assert!(!Error::connect_failed("x", "y").invalidates_session());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
