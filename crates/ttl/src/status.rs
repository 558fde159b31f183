//! Status words of R-APDUs

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a host order u16 value
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Host order u16 value (SW1 in the high byte)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Whether this is 90 00
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Whether this is a warning (62 XX or 63 XX)
    pub const fn is_warning(&self) -> bool {
        self.sw1 == 0x62 || self.sw1 == 0x63
    }

    /// Number of bytes the card has ready for GET RESPONSE (61 XX)
    pub const fn bytes_available(&self) -> Option<u8> {
        if self.sw1 == 0x61 {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Exact length the command should be resent with (6C XX)
    pub const fn corrected_le(&self) -> Option<u8> {
        if self.sw1 == 0x6C {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Whether SW1 is a valid first status byte (6X except 60, or 9X)
    pub const fn is_valid_sw1(sw1: u8) -> bool {
        (sw1 & 0xF0 == 0x60 && sw1 != 0x60) || sw1 & 0xF0 == 0x90
    }

    /// Tracing level for logging this status word
    pub const fn tracing_level(&self) -> Level {
        if self.is_success() || self.sw1 == 0x61 {
            Level::DEBUG
        } else if self.is_warning() {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "Response bytes still available",
            (0x62, 0x83) => "Selected file invalidated",
            (0x62, _) => "State of non-volatile memory unchanged",
            (0x63, 0x00) => "Authentication failed",
            (0x63, n) if (n & 0xF0) == 0xC0 => "Counter value",
            (0x63, _) => "State of non-volatile memory changed",
            (0x64, _) => "Execution error, memory unchanged",
            (0x65, _) => "Execution error, memory changed",
            (0x67, 0x00) => "Wrong length",
            (0x68, _) => "Function in CLA not supported",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x84) => "Referenced data invalidated",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, _) => "Command not allowed",
            (0x6A, 0x81) => "Function not supported",
            (0x6A, 0x82) => "File or application not found",
            (0x6A, 0x83) => "Record not found",
            (0x6A, 0x88) => "Referenced data not found",
            (0x6A, _) => "Wrong parameters P1-P2",
            (0x6B, 0x00) => "Wrong parameters P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Status words the EMV layers act on
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// Selected file invalidated (62 83), a blocked application on SELECT
    pub const SELECTED_FILE_INVALIDATED: StatusWord = StatusWord::new(0x62, 0x83);

    /// Conditions of use not satisfied (69 85)
    pub const CONDITIONS_OF_USE_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x85);

    /// Function not supported (6A 81), a blocked card on SELECT
    pub const FUNCTION_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6A, 0x81);

    /// File not found (6A 82)
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);

    /// Record not found (6A 83)
    pub const RECORD_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x83);

    /// Referenced data not found (6A 88)
    pub const REFERENCED_DATA_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);
}
