//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding sensor-hub packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to hold the packet.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Control body does not fit in the one-byte length field.
    #[error("control data too long: maximum {max} bytes, got {actual}")]
    DataTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length supplied.
        actual: usize,
    },

    /// Unknown control command code.
    #[error("unknown control command: {0}")]
    UnknownCtrlCommand(u8),

    /// Unknown notify command code.
    #[error("unknown notify command: {0}")]
    UnknownNotifyCommand(u8),

    /// Header checksum does not match the header bytes.
    #[error("crc8 mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    CrcMismatch {
        /// Checksum computed over the received header.
        expected: u8,
        /// Checksum carried in the frame.
        actual: u8,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Create a short-frame error.
    pub fn too_short(expected: usize, actual: usize) -> Self {
        ProtocolError::FrameTooShort { expected, actual }
    }
}
