//! Terminal transaction log entries
//!
//! The log is owned by the caller and handed to the kernel read-only, oldest
//! entry first. Each entry is a fixed 18 byte record:
//!
//! | Field | Length | Format |
//! |---|---|---|
//! | PAN | 10 | `cn`, padded with `F` |
//! | PAN sequence number | 1 | `n` |
//! | Transaction date | 3 | `n`, `YYMMDD` |
//! | Amount authorised | 4 | `b`, big endian |

use nexum_emv_tlv::format::EmvDate;

use crate::error::Error;

/// Maximum PAN length in bytes
pub const PAN_LEN: usize = 10;

/// Encoded length of one log entry
pub const ENTRY_LEN: usize = PAN_LEN + 1 + 3 + 4;

/// A completed transaction as recorded by the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnLogEntry {
    pan: [u8; PAN_LEN],
    pan_sequence_number: u8,
    date: [u8; 3],
    amount: u32,
}

impl TxnLogEntry {
    /// Create an entry
    ///
    /// `pan` is the value of tag `5A` and is padded with `FF` to ten bytes.
    pub fn new(pan: &[u8], pan_sequence_number: u8, date: EmvDate, amount: u32) -> Result<Self, Error> {
        Ok(Self {
            pan: padded_pan(pan)?,
            pan_sequence_number,
            date: date.to_yymmdd(),
            amount,
        })
    }

    /// Decode one entry
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let data: &[u8; ENTRY_LEN] = data
            .try_into()
            .map_err(|_| Error::Parse("transaction log entry length"))?;
        let mut pan = [0u8; PAN_LEN];
        pan.copy_from_slice(&data[..PAN_LEN]);
        let mut date = [0u8; 3];
        date.copy_from_slice(&data[11..14]);
        let mut amount = [0u8; 4];
        amount.copy_from_slice(&data[14..]);
        Ok(Self {
            pan,
            pan_sequence_number: data[10],
            date,
            amount: u32::from_be_bytes(amount),
        })
    }

    /// Decode a concatenation of entries, oldest first
    pub fn parse_log(data: &[u8]) -> Result<Vec<Self>, Error> {
        if data.len() % ENTRY_LEN != 0 {
            return Err(Error::Parse("transaction log length"));
        }
        data.chunks_exact(ENTRY_LEN).map(Self::from_bytes).collect()
    }

    /// Encode this entry
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        out[..PAN_LEN].copy_from_slice(&self.pan);
        out[10] = self.pan_sequence_number;
        out[11..14].copy_from_slice(&self.date);
        out[14..].copy_from_slice(&self.amount.to_be_bytes());
        out
    }

    /// Whether this entry was made with the card identified by `pan`
    ///
    /// `pan` is compared after padding it the same way the log stores it.
    pub fn matches_pan(&self, pan: &[u8]) -> bool {
        padded_pan(pan).is_ok_and(|padded| padded == self.pan)
    }

    /// Whether this entry was made with the card identified by `pan` and `pan_sequence_number`
    pub fn matches_card(&self, pan: &[u8], pan_sequence_number: Option<u8>) -> bool {
        self.matches_pan(pan)
            && pan_sequence_number.is_none_or(|psn| psn == self.pan_sequence_number)
    }

    /// Padded PAN
    pub const fn pan(&self) -> &[u8; PAN_LEN] {
        &self.pan
    }

    /// PAN sequence number
    pub const fn pan_sequence_number(&self) -> u8 {
        self.pan_sequence_number
    }

    /// Transaction date
    pub fn date(&self) -> Result<EmvDate, Error> {
        Ok(EmvDate::from_yymmdd(&self.date)?)
    }

    /// Amount authorised, in the minor unit of the transaction currency
    pub const fn amount(&self) -> u32 {
        self.amount
    }
}

fn padded_pan(pan: &[u8]) -> Result<[u8; PAN_LEN], Error> {
    if pan.is_empty() || pan.len() > PAN_LEN {
        return Err(Error::Parse("PAN length"));
    }
    let mut padded = [0xFF; PAN_LEN];
    padded[..pan.len()].copy_from_slice(pan);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_entry_layout() {
        let date = EmvDate::new(2024, 3, 15).unwrap();
        let entry = TxnLogEntry::new(&hex!("4761739001010010"), 1, date, 2500).unwrap();
        assert_eq!(
            entry.to_bytes(),
            hex!("4761739001010010FFFF 01 240315 000009C4")
        );
        assert_eq!(TxnLogEntry::from_bytes(&entry.to_bytes()).unwrap(), entry);
        assert_eq!(entry.date().unwrap(), date);
    }

    #[test]
    fn test_parse_log() {
        let log = hex!(
            "4761739001010010FFFF 01 240315 000009C4"
            "5413330089020011FFFF 00 240316 00000064"
        );
        let entries = TxnLogEntry::parse_log(&log).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].amount(), 100);
        assert!(matches!(
            TxnLogEntry::parse_log(&log[..20]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_matches_card() {
        let entry = TxnLogEntry::from_bytes(&hex!("4761739001010010FFFF 01 240315 000009C4")).unwrap();
        assert!(entry.matches_pan(&hex!("4761739001010010")));
        assert!(entry.matches_card(&hex!("4761739001010010"), Some(1)));
        assert!(entry.matches_card(&hex!("4761739001010010"), None));
        assert!(!entry.matches_card(&hex!("4761739001010010"), Some(2)));
        assert!(!entry.matches_pan(&hex!("4761739001010011")));
        assert!(!entry.matches_pan(&[0u8; 11]));
    }
}
