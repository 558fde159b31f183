//! Error types of the transport layer

use crate::command::ApduCase;

/// Failure reported by a card transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No reader or card connection
    #[error("Failed to connect to card")]
    Connection,

    /// Bytes could not be exchanged with the card
    #[error("Failed to transmit data")]
    Transmission,

    /// Card was removed from the reader
    #[error("Card removed")]
    CardRemoved,

    /// Reader or card did not answer in time
    #[error("Operation timed out")]
    Timeout,

    /// Driver specific error code
    #[error("Driver error code: {0}")]
    Driver(i32),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}

/// Errors raised while exchanging a command with the card
///
/// None of these are retried by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TtlError {
    /// Error from the underlying transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// C-APDU length does not match any ISO 7816 case
    #[error("Invalid C-APDU length: {0}")]
    InvalidCommandLength(usize),

    /// C-APDU uses an APDU case that is not supported for EMV contact cards
    #[error("Unsupported APDU case {0}")]
    UnsupportedCase(ApduCase),

    /// R-APDU or R-TPDU has a length that is invalid for the exchange
    #[error("Invalid response length: {0}")]
    InvalidResponseLength(usize),

    /// Card answered a TPDU header with an unknown procedure byte
    #[error("Unexpected procedure byte {0:#04X}")]
    UnexpectedProcedureByte(u8),

    /// Response data does not fit the output buffer
    #[error("Response buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Total number of response data bytes received so far
        needed: usize,
        /// Size of the output buffer
        available: usize,
    },

    /// Too many GET RESPONSE or Le correction rounds
    #[error("Exchange exceeded {0} rounds")]
    ChainLimitExceeded(usize),
}

/// Invalid parameters for an EMV command
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// DF name must be 5 to 16 bytes
    #[error("Invalid DF name length: {0}")]
    InvalidDfName(usize),

    /// SFI must be in the range 1 to 30
    #[error("Invalid SFI: {0}")]
    InvalidSfi(u8),

    /// Record number zero is not allowed
    #[error("Invalid record number: {0}")]
    InvalidRecordNumber(u8),

    /// Command data exceeds the short APDU maximum
    #[error("Command data too long: {0} bytes")]
    DataTooLong(usize),
}
