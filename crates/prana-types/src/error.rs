//! Error types for frame decoding and command lookup in prana-types.

use thiserror::Error;

/// Errors that can occur when decoding Prana frames or building commands.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in prana-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The state frame is shorter than the fixed frame length.
    #[error("State frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Required frame length.
        expected: usize,
        /// Length of the received buffer.
        actual: usize,
    },

    /// The state frame does not start with the command prefix.
    #[error("State frame has unexpected prefix {found:02X?}")]
    BadPrefix {
        /// The leading bytes that were found instead of the prefix.
        found: Vec<u8>,
    },

    /// A command table lookup was requested for a key it does not contain.
    #[error("Unsupported {table} value: {value}")]
    UnsupportedValue {
        /// Name of the command table.
        table: &'static str,
        /// The rejected key, rendered for display.
        value: String,
    },
}

impl ParseError {
    /// Create an unsupported-value error for a command table.
    pub fn unsupported(table: &'static str, value: impl ToString) -> Self {
        Self::UnsupportedValue {
            table,
            value: value.to_string(),
        }
    }

    /// Whether this error describes a structurally invalid frame.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Self::FrameTooShort { .. } | Self::BadPrefix { .. })
    }
}

/// Result type alias using prana-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
