//! Bit registers and structured fields
//!
//! Terminal Verification Results, Transaction Status Information and the
//! capability bitmaps are addressed as `(byte, mask)` pairs, with byte 0 being
//! the leftmost byte as transmitted.

use derive_more::Display;
use nexum_emv_tlv::{TlvEntry, TlvList};

use crate::error::Error;

/// A single bit of a multi byte register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bit {
    /// Byte index, 0 is the leftmost byte
    pub byte: usize,
    /// Mask within the byte
    pub mask: u8,
}

impl Bit {
    /// Create a bit reference
    pub const fn new(byte: usize, mask: u8) -> Self {
        Self { byte, mask }
    }

    /// Whether the bit is set in `value`; bytes beyond the end read as zero
    pub fn is_set(&self, value: &[u8]) -> bool {
        value.get(self.byte).is_some_and(|b| b & self.mask != 0)
    }

    /// Set the bit in `value`
    pub fn set(&self, value: &mut [u8]) -> Result<(), Error> {
        let byte = value
            .get_mut(self.byte)
            .ok_or(Error::Internal("register too short"))?;
        *byte |= self.mask;
        Ok(())
    }
}

/// Set a bit in the register stored under `tag`
pub(crate) fn set_bit(list: &mut TlvList, tag: u32, bit: Bit) -> Result<(), Error> {
    let entry = list
        .find_mut(tag)
        .ok_or(Error::Internal("register not initialised"))?;
    bit.set(entry.value_mut())
}

/// Whether a bit is set in the register stored under `tag`
pub(crate) fn bit_is_set(list: &TlvList, tag: u32, bit: Bit) -> bool {
    list.value(tag).is_some_and(|v| bit.is_set(v))
}

/// Terminal Verification Results (`95`)
pub mod tvr {
    use super::Bit;

    /// Length of the register
    pub const LEN: usize = 5;

    /// Offline data authentication was not performed
    pub const ODA_NOT_PERFORMED: Bit = Bit::new(0, 0x80);
    /// SDA failed
    pub const SDA_FAILED: Bit = Bit::new(0, 0x40);
    /// ICC data missing
    pub const ICC_DATA_MISSING: Bit = Bit::new(0, 0x20);
    /// Card appears on terminal exception file
    pub const CARD_ON_EXCEPTION_FILE: Bit = Bit::new(0, 0x10);
    /// DDA failed
    pub const DDA_FAILED: Bit = Bit::new(0, 0x08);
    /// CDA failed
    pub const CDA_FAILED: Bit = Bit::new(0, 0x04);
    /// SDA selected
    pub const SDA_SELECTED: Bit = Bit::new(0, 0x02);
    /// XDA selected
    pub const XDA_SELECTED: Bit = Bit::new(0, 0x01);

    /// ICC and terminal have different application versions
    pub const DIFFERENT_VERSIONS: Bit = Bit::new(1, 0x80);
    /// Expired application
    pub const EXPIRED_APPLICATION: Bit = Bit::new(1, 0x40);
    /// Application not yet effective
    pub const NOT_YET_EFFECTIVE: Bit = Bit::new(1, 0x20);
    /// Requested service not allowed for card product
    pub const SERVICE_NOT_ALLOWED: Bit = Bit::new(1, 0x10);
    /// New card
    pub const NEW_CARD: Bit = Bit::new(1, 0x08);

    /// Transaction exceeds floor limit
    pub const FLOOR_LIMIT_EXCEEDED: Bit = Bit::new(3, 0x80);
    /// Lower consecutive offline limit exceeded
    pub const LOWER_LIMIT_EXCEEDED: Bit = Bit::new(3, 0x40);
    /// Upper consecutive offline limit exceeded
    pub const UPPER_LIMIT_EXCEEDED: Bit = Bit::new(3, 0x20);
    /// Transaction selected randomly for online processing
    pub const RANDOMLY_SELECTED: Bit = Bit::new(3, 0x10);
}

/// Transaction Status Information (`9B`)
pub mod tsi {
    use super::Bit;

    /// Length of the register
    pub const LEN: usize = 2;

    /// Offline data authentication was performed
    pub const ODA_PERFORMED: Bit = Bit::new(0, 0x80);
    /// Cardholder verification was performed
    pub const CVM_PERFORMED: Bit = Bit::new(0, 0x40);
    /// Card risk management was performed
    pub const CARD_RISK_MANAGEMENT_PERFORMED: Bit = Bit::new(0, 0x20);
    /// Issuer authentication was performed
    pub const ISSUER_AUTHENTICATION_PERFORMED: Bit = Bit::new(0, 0x10);
    /// Terminal risk management was performed
    pub const TERMINAL_RISK_MANAGEMENT_PERFORMED: Bit = Bit::new(0, 0x08);
}

/// Application Interchange Profile (`82`)
pub mod aip {
    use super::Bit;

    /// SDA supported
    pub const SDA: Bit = Bit::new(0, 0x40);
    /// DDA supported
    pub const DDA: Bit = Bit::new(0, 0x20);
    /// Cardholder verification is supported
    pub const CARDHOLDER_VERIFICATION: Bit = Bit::new(0, 0x10);
    /// Terminal risk management is to be performed
    pub const TERMINAL_RISK_MANAGEMENT: Bit = Bit::new(0, 0x08);
    /// Issuer authentication is supported
    pub const ISSUER_AUTHENTICATION: Bit = Bit::new(0, 0x04);
    /// XDA supported
    pub const XDA: Bit = Bit::new(0, 0x02);
    /// CDA supported
    pub const CDA: Bit = Bit::new(0, 0x01);
}

/// Terminal Capabilities (`9F33`)
pub mod terminal_capabilities {
    use super::Bit;

    /// Static data authentication
    pub const SDA: Bit = Bit::new(2, 0x80);
    /// Dynamic data authentication
    pub const DDA: Bit = Bit::new(2, 0x40);
    /// Card capture
    pub const CARD_CAPTURE: Bit = Bit::new(2, 0x20);
    /// Combined DDA/application cryptogram generation
    pub const CDA: Bit = Bit::new(2, 0x08);
    /// Extended data authentication
    pub const XDA: Bit = Bit::new(2, 0x04);
}

/// Additional Terminal Capabilities (`9F40`)
pub mod additional_capabilities {
    use super::Bit;

    /// Cash transactions
    pub const CASH: Bit = Bit::new(0, 0x80);
    /// Goods
    pub const GOODS: Bit = Bit::new(0, 0x40);
    /// Services
    pub const SERVICES: Bit = Bit::new(0, 0x20);
    /// Cashback
    pub const CASHBACK: Bit = Bit::new(0, 0x10);

    /// Support for an Issuer Code Table Index (ISO/IEC 8859 part 1 to 10)
    pub const fn code_table(index: u8) -> Option<Bit> {
        match index {
            1..=8 => Some(Bit::new(4, 1 << (index - 1))),
            9 | 10 => Some(Bit::new(3, 1 << (index - 9))),
            _ => None,
        }
    }
}

/// Application Usage Control (`9F07`)
pub mod auc {
    use super::Bit;

    /// Valid for domestic cash transactions
    pub const DOMESTIC_CASH: Bit = Bit::new(0, 0x80);
    /// Valid for international cash transactions
    pub const INTERNATIONAL_CASH: Bit = Bit::new(0, 0x40);
    /// Valid for domestic goods
    pub const DOMESTIC_GOODS: Bit = Bit::new(0, 0x20);
    /// Valid for international goods
    pub const INTERNATIONAL_GOODS: Bit = Bit::new(0, 0x10);
    /// Valid for domestic services
    pub const DOMESTIC_SERVICES: Bit = Bit::new(0, 0x08);
    /// Valid for international services
    pub const INTERNATIONAL_SERVICES: Bit = Bit::new(0, 0x04);
    /// Valid at ATMs
    pub const ATM: Bit = Bit::new(0, 0x02);
    /// Valid at terminals other than ATMs
    pub const NON_ATM: Bit = Bit::new(0, 0x01);
    /// Domestic cashback allowed
    pub const DOMESTIC_CASHBACK: Bit = Bit::new(1, 0x80);
    /// International cashback allowed
    pub const INTERNATIONAL_CASHBACK: Bit = Bit::new(1, 0x40);
}

/// Transaction Type (`9C`) values the kernel distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransactionType {
    /// Purchase of goods or services (`00`)
    #[display("purchase")]
    Purchase,
    /// Cash withdrawal or cash advance (`01`)
    #[display("cash")]
    Cash,
    /// Purchase with cashback (`09`)
    #[display("cashback")]
    Cashback,
    /// Any other transaction type
    #[display("other({_0:02X})")]
    Other(u8),
}

impl From<u8> for TransactionType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Purchase,
            0x01 | 0x17 => Self::Cash,
            0x09 => Self::Cashback,
            other => Self::Other(other),
        }
    }
}

/// Application Priority Indicator (`87`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PriorityIndicator(pub u8);

impl PriorityIndicator {
    /// Application cannot be selected without confirmation of the cardholder
    pub const fn confirmation_required(&self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Priority, 1 is highest; `None` when no priority is assigned
    pub const fn priority(&self) -> Option<u8> {
        match self.0 & 0x0F {
            0 => None,
            p => Some(p),
        }
    }
}

/// One entry of the Application File Locator (`94`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AflEntry {
    /// Short file identifier, 1 to 30
    pub sfi: u8,
    /// First record to read
    pub first_record: u8,
    /// Last record to read
    pub last_record: u8,
    /// Number of records, starting at `first_record`, used for offline data authentication
    pub oda_records: u8,
}

impl AflEntry {
    /// Parse a complete AFL
    ///
    /// The AFL must be a non-empty multiple of four bytes and every entry must
    /// be well formed.
    pub fn parse_all(afl: &[u8]) -> Result<Vec<Self>, Error> {
        if afl.is_empty() || afl.len() % 4 != 0 {
            return Err(Error::Parse("AFL length"));
        }
        afl.chunks_exact(4).map(Self::parse).collect()
    }

    fn parse(entry: &[u8]) -> Result<Self, Error> {
        let sfi = entry[0] >> 3;
        if entry[0] & 0x07 != 0 || !(1..=30).contains(&sfi) {
            return Err(Error::Parse("AFL SFI"));
        }
        let (first_record, last_record, oda_records) = (entry[1], entry[2], entry[3]);
        if first_record == 0 || last_record < first_record {
            return Err(Error::Parse("AFL record range"));
        }
        if u16::from(oda_records) > u16::from(last_record - first_record) + 1 {
            return Err(Error::Parse("AFL ODA record count"));
        }
        Ok(Self {
            sfi,
            first_record,
            last_record,
            oda_records,
        })
    }

    /// Records to read, in order
    pub fn records(&self) -> impl Iterator<Item = u8> {
        self.first_record..=self.last_record
    }

    /// Whether `record` is used for offline data authentication
    pub const fn is_oda_record(&self, record: u8) -> bool {
        record >= self.first_record && ((record - self.first_record) as u16) < self.oda_records as u16
    }
}

/// Register entry initialised to all zeros
pub(crate) fn zeroed_register(tag: u32, len: usize) -> Result<TlvEntry, Error> {
    Ok(TlvEntry::new(tag, vec![0u8; len], nexum_emv_tlv::TlvFlags::NONE)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use nexum_emv_tlv::TlvFlags;

    #[test]
    fn test_bit_set_and_query() {
        let mut tvr = [0u8; tvr::LEN];
        tvr::FLOOR_LIMIT_EXCEEDED.set(&mut tvr).unwrap();
        tvr::SDA_FAILED.set(&mut tvr).unwrap();
        assert_eq!(tvr, hex!("4000008000"));
        assert!(tvr::FLOOR_LIMIT_EXCEEDED.is_set(&tvr));
        assert!(!tvr::NEW_CARD.is_set(&tvr));
        assert!(Bit::new(7, 0x01).set(&mut tvr).is_err());
    }

    #[test]
    fn test_set_bit_in_list() {
        let mut list = TlvList::new();
        list.push(0x95, [0u8; 5], TlvFlags::NONE).unwrap();
        set_bit(&mut list, 0x95, tvr::NEW_CARD).unwrap();
        assert!(bit_is_set(&list, 0x95, tvr::NEW_CARD));
        assert!(set_bit(&mut list, 0x9B, tsi::ODA_PERFORMED).is_err());
    }

    #[test]
    fn test_afl_parse() {
        let afl = AflEntry::parse_all(&hex!("08010100 10010301")).unwrap();
        assert_eq!(afl.len(), 2);
        assert_eq!(afl[0].sfi, 1);
        assert_eq!(afl[1].sfi, 2);
        assert_eq!(afl[1].records().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(afl[1].is_oda_record(1));
        assert!(!afl[1].is_oda_record(2));
    }

    #[test]
    fn test_afl_rejects_malformed() {
        assert!(matches!(AflEntry::parse_all(&hex!("080101")), Err(Error::Parse(_))));
        assert!(matches!(AflEntry::parse_all(&[]), Err(Error::Parse(_))));
        // SFI 0
        assert!(matches!(AflEntry::parse_all(&hex!("00010100")), Err(Error::Parse(_))));
        // SFI 31
        assert!(matches!(AflEntry::parse_all(&hex!("F8010100")), Err(Error::Parse(_))));
        // Record range reversed
        assert!(matches!(AflEntry::parse_all(&hex!("08030100")), Err(Error::Parse(_))));
        // More ODA records than records
        assert!(matches!(AflEntry::parse_all(&hex!("08010203")), Err(Error::Parse(_))));
    }

    #[test]
    fn test_priority_indicator() {
        let api = PriorityIndicator(0x81);
        assert!(api.confirmation_required());
        assert_eq!(api.priority(), Some(1));
        assert_eq!(PriorityIndicator(0x00).priority(), None);
    }

    #[test]
    fn test_code_table_bits() {
        assert_eq!(additional_capabilities::code_table(1), Some(Bit::new(4, 0x01)));
        assert_eq!(additional_capabilities::code_table(8), Some(Bit::new(4, 0x80)));
        assert_eq!(additional_capabilities::code_table(10), Some(Bit::new(3, 0x02)));
        assert_eq!(additional_capabilities::code_table(11), None);
    }

    #[test]
    fn test_transaction_type() {
        assert_eq!(TransactionType::from(0x00), TransactionType::Purchase);
        assert_eq!(TransactionType::from(0x09), TransactionType::Cashback);
        assert_eq!(TransactionType::from(0x20).to_string(), "other(20)");
    }
}
