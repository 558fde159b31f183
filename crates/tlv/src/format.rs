//! Numeric and date field helpers

use std::cmp::Ordering;
use std::fmt;

use crate::error::TlvError;

/// Decode a numeric (`n`) BCD field
pub fn bcd_to_u64(data: &[u8]) -> Result<u64, TlvError> {
    let mut value: u64 = 0;
    for byte in data {
        for nibble in [byte >> 4, byte & 0x0F] {
            if nibble > 9 {
                return Err(TlvError::InvalidBcd);
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(nibble)))
                .ok_or(TlvError::NumericOverflow)?;
        }
    }
    Ok(value)
}

/// Encode a value as a numeric (`n`) BCD field of `len` bytes
///
/// Digits that do not fit are dropped from the left.
pub fn u64_to_bcd(mut value: u64, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for byte in out.iter_mut().rev() {
        let low = (value % 10) as u8;
        value /= 10;
        let high = (value % 10) as u8;
        value /= 10;
        *byte = (high << 4) | low;
    }
    out
}

/// Decode an unsigned big endian binary (`b`) field
pub fn binary_to_u64(data: &[u8]) -> Result<u64, TlvError> {
    let significant = data
        .iter()
        .position(|b| *b != 0)
        .map_or(&data[data.len()..], |start| &data[start..]);
    if significant.len() > 8 {
        return Err(TlvError::NumericOverflow);
    }
    Ok(significant
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// A calendar date as carried in EMV `YYMMDD` fields
///
/// Two digit years below 50 are in the 21st century, the rest in the 20th.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmvDate {
    year: u16,
    month: u8,
    day: u8,
}

impl EmvDate {
    /// Create a date, validating month and day
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, TlvError> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(TlvError::InvalidDate);
        }
        Ok(Self { year, month, day })
    }

    /// Decode a 3 byte `YYMMDD` BCD field
    pub fn from_yymmdd(data: &[u8]) -> Result<Self, TlvError> {
        let [yy, mm, dd] = <[u8; 3]>::try_from(data).map_err(|_| TlvError::InvalidDate)?;
        let yy = bcd_to_u64(&[yy])? as u16;
        let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
        Self::new(year, bcd_to_u64(&[mm])? as u8, bcd_to_u64(&[dd])? as u8)
    }

    /// Encode as a 3 byte `YYMMDD` BCD field
    pub fn to_yymmdd(&self) -> [u8; 3] {
        let bcd = |v: u64| u64_to_bcd(v, 1)[0];
        [
            bcd(u64::from(self.year % 100)),
            bcd(u64::from(self.month)),
            bcd(u64::from(self.day)),
        ]
    }

    /// Four digit year
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// Month, 1 to 12
    pub const fn month(&self) -> u8 {
        self.month
    }

    /// Day of the month
    pub const fn day(&self) -> u8 {
        self.day
    }
}

impl PartialOrd for EmvDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EmvDate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month, self.day).cmp(&(other.year, other.month, other.day))
    }
}

impl fmt::Display for EmvDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_bcd() {
        assert_eq!(bcd_to_u64(&hex!("000000001234")).unwrap(), 1234);
        assert_eq!(bcd_to_u64(&hex!("1A")), Err(TlvError::InvalidBcd));
        assert_eq!(u64_to_bcd(1234, 6), hex!("000000001234"));
        assert_eq!(u64_to_bcd(123456, 2), hex!("3456"));
    }

    #[test]
    fn test_binary() {
        assert_eq!(binary_to_u64(&hex!("00002710")).unwrap(), 10_000);
        assert_eq!(binary_to_u64(&[]).unwrap(), 0);
        assert_eq!(
            binary_to_u64(&hex!("010000000000000000")),
            Err(TlvError::NumericOverflow)
        );
    }

    #[test]
    fn test_date_century_pivot() {
        let date = EmvDate::from_yymmdd(&hex!("491231")).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2049, 12, 31));

        let date = EmvDate::from_yymmdd(&hex!("500101")).unwrap();
        assert_eq!(date.year(), 1950);
        assert!(date < EmvDate::from_yymmdd(&hex!("000101")).unwrap());
    }

    #[test]
    fn test_date_validation() {
        assert_eq!(
            EmvDate::from_yymmdd(&hex!("241301")),
            Err(TlvError::InvalidDate)
        );
        assert_eq!(
            EmvDate::from_yymmdd(&hex!("230229")),
            Err(TlvError::InvalidDate)
        );
        assert!(EmvDate::from_yymmdd(&hex!("240229")).is_ok());
        assert_eq!(EmvDate::from_yymmdd(&hex!("2402")), Err(TlvError::InvalidDate));
    }

    #[test]
    fn test_date_encode() {
        let date = EmvDate::new(2031, 7, 4).unwrap();
        assert_eq!(date.to_yymmdd(), hex!("310704"));
        assert_eq!(date.to_string(), "2031-07-04");
    }
}
