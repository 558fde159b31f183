//! EMV card command builders (EMV Book 3, section 6.5)

use bytes::Bytes;
use derive_more::Display;

use crate::command::{Command, MAX_COMMAND_DATA_LEN};
use crate::error::CommandError;

/// Class byte of ISO 7816-4 inter-industry commands
pub const CLA_ISO: u8 = 0x00;
/// Class byte of EMV proprietary commands
pub const CLA_EMV: u8 = 0x80;

/// SELECT instruction
pub const INS_SELECT: u8 = 0xA4;
/// READ RECORD instruction
pub const INS_READ_RECORD: u8 = 0xB2;
/// GET PROCESSING OPTIONS instruction
pub const INS_GET_PROCESSING_OPTIONS: u8 = 0xA8;
/// GET DATA instruction
pub const INS_GET_DATA: u8 = 0xCA;
/// INTERNAL AUTHENTICATE instruction
pub const INS_INTERNAL_AUTHENTICATE: u8 = 0x88;
/// GENERATE APPLICATION CRYPTOGRAM instruction
pub const INS_GENERATE_AC: u8 = 0xAE;
/// GET RESPONSE instruction
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// Minimum length of a DF name in SELECT
pub const MIN_DF_NAME_LEN: usize = 5;
/// Maximum length of a DF name in SELECT
pub const MAX_DF_NAME_LEN: usize = 16;

/// Which occurrence of a partially matching DF name to select
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum SelectOccurrence {
    /// First or only occurrence
    #[default]
    #[display("first")]
    First,
    /// Next occurrence
    #[display("next")]
    Next,
}

/// Cryptogram type requested with GENERATE AC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CryptogramType {
    /// Application Authentication Cryptogram, decline
    #[display("AAC")]
    Aac,
    /// Transaction Certificate, approve offline
    #[display("TC")]
    Tc,
    /// Authorisation Request Cryptogram, go online
    #[display("ARQC")]
    Arqc,
}

impl CryptogramType {
    /// Reference control bits (b8-b7 of P1 and of the Cryptogram Information Data)
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Aac => 0x00,
            Self::Tc => 0x40,
            Self::Arqc => 0x80,
        }
    }

    /// Decode b8-b7 of the Cryptogram Information Data
    ///
    /// `11` is reserved for future use and yields `None`.
    pub const fn from_cid(cid: u8) -> Option<Self> {
        match cid & 0xC0 {
            0x00 => Some(Self::Aac),
            0x40 => Some(Self::Tc),
            0x80 => Some(Self::Arqc),
            _ => None,
        }
    }
}

/// P1 bit requesting a CDA signature with GENERATE AC
pub const GENAC_CDA_SIGNATURE: u8 = 0x10;

fn checked_data(data: &[u8]) -> Result<Bytes, CommandError> {
    if data.len() > MAX_COMMAND_DATA_LEN {
        return Err(CommandError::DataTooLong(data.len()));
    }
    Ok(Bytes::copy_from_slice(data))
}

/// SELECT by DF name
pub fn select(df_name: &[u8], occurrence: SelectOccurrence) -> Result<Command, CommandError> {
    if !(MIN_DF_NAME_LEN..=MAX_DF_NAME_LEN).contains(&df_name.len()) {
        return Err(CommandError::InvalidDfName(df_name.len()));
    }
    let p2 = match occurrence {
        SelectOccurrence::First => 0x00,
        SelectOccurrence::Next => 0x02,
    };
    Ok(Command::new(CLA_ISO, INS_SELECT, 0x04, p2)
        .with_data(Bytes::copy_from_slice(df_name))
        .with_le(0x00))
}

/// READ RECORD of a record in a file referenced by SFI
pub fn read_record(sfi: u8, record: u8) -> Result<Command, CommandError> {
    if !(1..=30).contains(&sfi) {
        return Err(CommandError::InvalidSfi(sfi));
    }
    if record == 0 {
        return Err(CommandError::InvalidRecordNumber(record));
    }
    Ok(Command::new(CLA_ISO, INS_READ_RECORD, record, (sfi << 3) | 0x04).with_le(0x00))
}

/// GET PROCESSING OPTIONS with an encoded Command Template (`83`) as data
pub fn get_processing_options(data: &[u8]) -> Result<Command, CommandError> {
    Ok(Command::new(CLA_EMV, INS_GET_PROCESSING_OPTIONS, 0x00, 0x00)
        .with_data(checked_data(data)?)
        .with_le(0x00))
}

/// GET DATA of a two byte tag such as ATC (`9F36`)
pub const fn get_data(tag: u16) -> Command {
    let [p1, p2] = tag.to_be_bytes();
    Command::new(CLA_EMV, INS_GET_DATA, p1, p2).with_le(0x00)
}

/// INTERNAL AUTHENTICATE with DDOL related data
pub fn internal_authenticate(data: &[u8]) -> Result<Command, CommandError> {
    Ok(Command::new(CLA_ISO, INS_INTERNAL_AUTHENTICATE, 0x00, 0x00)
        .with_data(checked_data(data)?)
        .with_le(0x00))
}

/// GENERATE AC with CDOL related data
pub fn generate_ac(
    cryptogram: CryptogramType,
    cda: bool,
    data: &[u8],
) -> Result<Command, CommandError> {
    let p1 = cryptogram.bits() | if cda { GENAC_CDA_SIGNATURE } else { 0x00 };
    Ok(Command::new(CLA_EMV, INS_GENERATE_AC, p1, 0x00)
        .with_data(checked_data(data)?)
        .with_le(0x00))
}

/// GET RESPONSE for `le` bytes
pub const fn get_response(le: u8) -> Command {
    Command::new(CLA_ISO, INS_GET_RESPONSE, 0x00, 0x00).with_le(le)
}
