//! C-APDU definitions and ISO 7816-3 case classification

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::Display;

use crate::error::TtlError;

/// Maximum length of the command data field of a short C-APDU
pub const MAX_COMMAND_DATA_LEN: usize = 255;

/// Maximum length of the response data field of a short R-APDU
pub const MAX_RESPONSE_DATA_LEN: usize = 256;

/// Length of the C-APDU header (CLA INS P1 P2)
pub const HEADER_LEN: usize = 4;

/// Length of a C-TPDU header (CLA INS P1 P2 P3)
pub const TPDU_HEADER_LEN: usize = 5;

/// ISO 7816-3 command case, derived from the C-APDU length alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ApduCase {
    /// No command data, no response data
    #[display("1")]
    Case1,
    /// No command data, short Le
    #[display("2S")]
    Case2S,
    /// Short Lc and command data, no response data
    #[display("3S")]
    Case3S,
    /// Short Lc, command data and short Le
    #[display("4S")]
    Case4S,
    /// No command data, extended Le
    #[display("2E")]
    Case2E,
    /// Extended Lc and command data, no response data
    #[display("3E")]
    Case3E,
    /// Extended Lc, command data and extended Le
    #[display("4E")]
    Case4E,
}

impl ApduCase {
    /// Classify a C-APDU
    ///
    /// Any layout that does not match one of the seven cases is rejected.
    pub fn classify(c_apdu: &[u8]) -> Result<Self, TtlError> {
        let len = c_apdu.len();
        let invalid = || TtlError::InvalidCommandLength(len);

        if len < HEADER_LEN {
            return Err(invalid());
        }
        if len == HEADER_LEN {
            return Ok(Self::Case1);
        }

        let b1 = usize::from(c_apdu[HEADER_LEN]);
        if len == HEADER_LEN + 1 {
            return Ok(Self::Case2S);
        }
        if b1 != 0 {
            return match len - HEADER_LEN - 1 {
                n if n == b1 => Ok(Self::Case3S),
                n if n == b1 + 1 => Ok(Self::Case4S),
                _ => Err(invalid()),
            };
        }

        // B1 = 00 introduces an extended length field
        if len == HEADER_LEN + 3 {
            return Ok(Self::Case2E);
        }
        let b2b3 = c_apdu
            .get(HEADER_LEN + 1..HEADER_LEN + 3)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
            .ok_or_else(invalid)?;
        if b2b3 == 0 {
            return Err(invalid());
        }
        match len - HEADER_LEN - 3 {
            n if n == b2b3 => Ok(Self::Case3E),
            n if n == b2b3 + 2 => Ok(Self::Case4E),
            _ => Err(invalid()),
        }
    }

    /// Whether this is one of the short cases EMV contact cards use
    pub const fn is_short(&self) -> bool {
        matches!(self, Self::Case1 | Self::Case2S | Self::Case3S | Self::Case4S)
    }

    /// Whether the command carries data
    pub const fn has_data(&self) -> bool {
        matches!(
            self,
            Self::Case3S | Self::Case4S | Self::Case3E | Self::Case4E
        )
    }

    /// Whether the command expects response data
    pub const fn expects_data(&self) -> bool {
        matches!(
            self,
            Self::Case2S | Self::Case4S | Self::Case2E | Self::Case4E
        )
    }
}

/// A short C-APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional), `00` requests up to 256 bytes
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// ISO 7816-3 case of this command
    pub fn case(&self) -> ApduCase {
        match (self.data.as_ref().is_some_and(|d| !d.is_empty()), self.le) {
            (false, None) => ApduCase::Case1,
            (false, Some(_)) => ApduCase::Case2S,
            (true, None) => ApduCase::Case3S,
            (true, Some(_)) => ApduCase::Case4S,
        }
    }

    /// Length of the serialized command
    pub fn command_length(&self) -> usize {
        let data_len = self.data.as_ref().map_or(0, |d| d.len());
        HEADER_LEN
            + if data_len > 0 { 1 + data_len } else { 0 }
            + usize::from(self.le.is_some())
    }

    /// Serialize to raw C-APDU bytes
    ///
    /// Fails if the data field does not fit a short APDU.
    pub fn to_bytes(&self) -> Result<Bytes, TtlError> {
        let mut buffer = BytesMut::with_capacity(self.command_length());
        buffer.put_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            let lc = u8::try_from(data.len())
                .map_err(|_| TtlError::InvalidCommandLength(self.command_length()))?;
            buffer.put_u8(lc);
            buffer.put_slice(data);
        }
        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Parse a short C-APDU
    pub fn from_bytes(data: &[u8]) -> Result<Self, TtlError> {
        let case = ApduCase::classify(data)?;
        if !case.is_short() {
            return Err(TtlError::UnsupportedCase(case));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        match case {
            ApduCase::Case2S => command.le = Some(data[4]),
            ApduCase::Case3S => command.data = Some(Bytes::copy_from_slice(&data[5..])),
            ApduCase::Case4S => {
                let end = data.len() - 1;
                command.data = Some(Bytes::copy_from_slice(&data[5..end]));
                command.le = Some(data[end]);
            }
            _ => {}
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_classify_short_cases() {
        assert_eq!(ApduCase::classify(&hex!("00A40400")).unwrap(), ApduCase::Case1);
        assert_eq!(ApduCase::classify(&hex!("00B2010C00")).unwrap(), ApduCase::Case2S);
        assert_eq!(ApduCase::classify(&hex!("80A80000 02 8300")).unwrap(), ApduCase::Case3S);
        assert_eq!(ApduCase::classify(&hex!("80A80000 02 8300 00")).unwrap(), ApduCase::Case4S);
    }

    #[test]
    fn test_classify_extended_cases() {
        assert_eq!(ApduCase::classify(&hex!("00B00000 000100")).unwrap(), ApduCase::Case2E);
        assert_eq!(ApduCase::classify(&hex!("00D60000 000002 0102")).unwrap(), ApduCase::Case3E);
        assert_eq!(
            ApduCase::classify(&hex!("00D60000 000002 0102 0100")).unwrap(),
            ApduCase::Case4E
        );
    }

    #[test]
    fn test_classify_rejects_malformed() {
        assert!(matches!(
            ApduCase::classify(&hex!("00A404")),
            Err(TtlError::InvalidCommandLength(3))
        ));
        // Lc says three bytes, only two follow
        assert!(matches!(
            ApduCase::classify(&hex!("00A40400 03 0102")),
            Err(TtlError::InvalidCommandLength(7))
        ));
        // Lc says one byte, three follow
        assert!(matches!(
            ApduCase::classify(&hex!("00A40400 01 010203")),
            Err(TtlError::InvalidCommandLength(8))
        ));
        // Extended Lc of zero
        assert!(matches!(
            ApduCase::classify(&hex!("00A40400 000000 01")),
            Err(TtlError::InvalidCommandLength(8))
        ));
    }

    #[test]
    fn test_classify_is_layout_invariant() {
        // Same layout, different header and data bytes
        let a = ApduCase::classify(&hex!("00A40400 07 A0000000031010 00")).unwrap();
        let b = ApduCase::classify(&hex!("80AE8000 07 11223344556677 FF")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_command_serialization() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00)
            .with_data(Bytes::from_static(&hex!("A0000000031010")))
            .with_le(0x00);
        assert_eq!(cmd.case(), ApduCase::Case4S);
        assert_eq!(cmd.command_length(), 13);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("00A40400 07 A0000000031010 00"));
    }

    #[test]
    fn test_command_rejects_oversized_data() {
        let cmd = Command::new(0x80, 0xAE, 0x80, 0x00).with_data(vec![0u8; 256]);
        assert!(matches!(
            cmd.to_bytes(),
            Err(TtlError::InvalidCommandLength(261))
        ));
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&hex!("00B2010C00")).unwrap();
        assert_eq!((cmd.cla, cmd.ins, cmd.p1, cmd.p2), (0x00, 0xB2, 0x01, 0x0C));
        assert!(cmd.data.is_none());
        assert_eq!(cmd.le, Some(0x00));

        let cmd = Command::from_bytes(&hex!("80A80000 02 8300 00")).unwrap();
        assert_eq!(cmd.data.as_deref(), Some(hex!("8300").as_ref()));
        assert_eq!(cmd.le, Some(0x00));

        assert!(matches!(
            Command::from_bytes(&hex!("00B00000 000100")),
            Err(TtlError::UnsupportedCase(ApduCase::Case2E))
        ));
    }
}
