//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the pump protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is shorter than the layout of its command requires.
    #[error("frame too short for command 0x{command:04X}: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Command code the payload was addressed to.
        command: u16,
        /// Minimum payload length for the command.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// A field read past the end of the payload.
    #[error("read of {width} bytes at offset {offset} exceeds payload length {len}")]
    OffsetOutOfBounds {
        /// Offset of the field.
        offset: usize,
        /// Width of the field in bytes.
        width: usize,
        /// Length of the payload.
        len: usize,
    },

    /// A write would exceed the frame capacity.
    #[error("frame overflow: writing {width} bytes at {position} exceeds capacity {capacity}")]
    FrameOverflow {
        /// Current write position.
        position: usize,
        /// Width of the field in bytes.
        width: usize,
        /// Capacity of the payload area.
        capacity: usize,
    },

    /// Packet envelope is malformed (markers, type byte or length).
    #[error("bad packet envelope: {0}")]
    BadEnvelope(String),

    /// CRC of a received packet does not match its contents.
    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch {
        /// Checksum computed over the packet.
        expected: u16,
        /// Checksum carried in the packet.
        actual: u16,
    },

    /// A value cannot be written as a BCD byte.
    #[error("value {0} cannot be BCD encoded")]
    InvalidBcd(u32),

    /// No parameterless outbound command exists for this code.
    #[error("command 0x{0:04X} cannot be built without parameters")]
    UnsupportedEncode(u16),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
