//! Error type for TLV, DOL and field decoding

use crate::ber::MAX_TAG_LEN;

/// Errors produced while decoding or building TLV data
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// Input ended in the middle of a tag, length or value
    #[error("Truncated BER-TLV encoding")]
    Truncated,

    /// Tag is zero or otherwise not a valid BER tag
    #[error("Invalid tag")]
    InvalidTag,

    /// Tag is longer than the supported maximum
    #[error("Tag exceeds {MAX_TAG_LEN} bytes")]
    TagTooLong,

    /// Indefinite length form (0x80) was used
    #[error("Indefinite length form is not supported")]
    IndefiniteLength,

    /// Length field uses more than four subsequent bytes
    #[error("Length field exceeds 4 bytes")]
    LengthTooLong,

    /// Bytes remain after the outermost template
    #[error("Trailing data after template: {0} bytes")]
    TrailingData(usize),

    /// Built DOL data would exceed the given capacity
    #[error("DOL data exceeds {0} bytes")]
    DolDataTooLong(usize),

    /// A numeric field contained a nibble above 9
    #[error("Invalid BCD digit")]
    InvalidBcd,

    /// A numeric or binary field does not fit in 64 bits
    #[error("Numeric value does not fit in 64 bits")]
    NumericOverflow,

    /// A date field did not describe a valid calendar date
    #[error("Invalid date")]
    InvalidDate,
}
