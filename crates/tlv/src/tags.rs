//! EMV tag catalogue
//!
//! Tags are stored as their big endian integer value (`0x9F38` for PDOL).

use derive_more::Display;

/// Application Dedicated File (ADF) Name / AID as returned by the card
pub const AID: u32 = 0x4F;
/// Application Label
pub const APPLICATION_LABEL: u32 = 0x50;
/// Track 2 Equivalent Data
pub const TRACK2_EQUIVALENT_DATA: u32 = 0x57;
/// Application Primary Account Number (PAN)
pub const PAN: u32 = 0x5A;
/// Cardholder Name
pub const CARDHOLDER_NAME: u32 = 0x5F20;
/// Application Expiration Date (YYMMDD)
pub const APPLICATION_EXPIRATION_DATE: u32 = 0x5F24;
/// Application Effective Date (YYMMDD)
pub const APPLICATION_EFFECTIVE_DATE: u32 = 0x5F25;
/// Issuer Country Code
pub const ISSUER_COUNTRY_CODE: u32 = 0x5F28;
/// Transaction Currency Code
pub const TRANSACTION_CURRENCY_CODE: u32 = 0x5F2A;
/// Language Preference
pub const LANGUAGE_PREFERENCE: u32 = 0x5F2D;
/// Service Code
pub const SERVICE_CODE: u32 = 0x5F30;
/// Application PAN Sequence Number
pub const PAN_SEQUENCE_NUMBER: u32 = 0x5F34;
/// Transaction Currency Exponent
pub const TRANSACTION_CURRENCY_EXPONENT: u32 = 0x5F36;
/// Application Template
pub const APPLICATION_TEMPLATE: u32 = 0x61;
/// File Control Information (FCI) Template
pub const FCI_TEMPLATE: u32 = 0x6F;
/// READ RECORD Response Message Template
pub const READ_RECORD_TEMPLATE: u32 = 0x70;
/// Response Message Template Format 2
pub const RESPONSE_FORMAT_2: u32 = 0x77;
/// Response Message Template Format 1
pub const RESPONSE_FORMAT_1: u32 = 0x80;
/// Amount, Authorised (Binary)
pub const AMOUNT_AUTHORISED_BINARY: u32 = 0x81;
/// Application Interchange Profile
pub const AIP: u32 = 0x82;
/// Command Template (GPO data)
pub const COMMAND_TEMPLATE: u32 = 0x83;
/// Dedicated File (DF) Name
pub const DF_NAME: u32 = 0x84;
/// Application Priority Indicator
pub const APPLICATION_PRIORITY_INDICATOR: u32 = 0x87;
/// Short File Identifier (SFI)
pub const SFI: u32 = 0x88;
/// Authorisation Response Code
pub const AUTHORISATION_RESPONSE_CODE: u32 = 0x8A;
/// Card Risk Management Data Object List 1
pub const CDOL1: u32 = 0x8C;
/// Card Risk Management Data Object List 2
pub const CDOL2: u32 = 0x8D;
/// Cardholder Verification Method (CVM) List
pub const CVM_LIST: u32 = 0x8E;
/// Certification Authority Public Key Index (ICC)
pub const CAPK_INDEX: u32 = 0x8F;
/// Issuer Public Key Certificate
pub const ISSUER_PUBLIC_KEY_CERTIFICATE: u32 = 0x90;
/// Issuer Public Key Remainder
pub const ISSUER_PUBLIC_KEY_REMAINDER: u32 = 0x92;
/// Signed Static Application Data
pub const SIGNED_STATIC_APPLICATION_DATA: u32 = 0x93;
/// Application File Locator
pub const AFL: u32 = 0x94;
/// Terminal Verification Results
pub const TVR: u32 = 0x95;
/// Transaction Date (YYMMDD)
pub const TRANSACTION_DATE: u32 = 0x9A;
/// Transaction Status Information
pub const TSI: u32 = 0x9B;
/// Transaction Type
pub const TRANSACTION_TYPE: u32 = 0x9C;
/// Directory Definition File (DDF) Name
pub const DDF_NAME: u32 = 0x9D;
/// Amount, Authorised (Numeric)
pub const AMOUNT_AUTHORISED_NUMERIC: u32 = 0x9F02;
/// Amount, Other (Numeric)
pub const AMOUNT_OTHER_NUMERIC: u32 = 0x9F03;
/// Amount, Other (Binary)
pub const AMOUNT_OTHER_BINARY: u32 = 0x9F04;
/// Application Identifier (AID) - terminal
pub const AID_TERMINAL: u32 = 0x9F06;
/// Application Usage Control
pub const APPLICATION_USAGE_CONTROL: u32 = 0x9F07;
/// Application Version Number (ICC)
pub const APPLICATION_VERSION_NUMBER_ICC: u32 = 0x9F08;
/// Application Version Number (terminal)
pub const APPLICATION_VERSION_NUMBER_TERMINAL: u32 = 0x9F09;
/// Issuer Action Code - Default
pub const IAC_DEFAULT: u32 = 0x9F0D;
/// Issuer Action Code - Denial
pub const IAC_DENIAL: u32 = 0x9F0E;
/// Issuer Action Code - Online
pub const IAC_ONLINE: u32 = 0x9F0F;
/// Issuer Application Data
pub const ISSUER_APPLICATION_DATA: u32 = 0x9F10;
/// Issuer Code Table Index
pub const ISSUER_CODE_TABLE_INDEX: u32 = 0x9F11;
/// Application Preferred Name
pub const APPLICATION_PREFERRED_NAME: u32 = 0x9F12;
/// Last Online Application Transaction Counter (ATC) Register
pub const LAST_ONLINE_ATC_REGISTER: u32 = 0x9F13;
/// Lower Consecutive Offline Limit
pub const LOWER_CONSECUTIVE_OFFLINE_LIMIT: u32 = 0x9F14;
/// Merchant Category Code
pub const MERCHANT_CATEGORY_CODE: u32 = 0x9F15;
/// Terminal Country Code
pub const TERMINAL_COUNTRY_CODE: u32 = 0x9F1A;
/// Terminal Floor Limit
pub const TERMINAL_FLOOR_LIMIT: u32 = 0x9F1B;
/// Terminal Identification
pub const TERMINAL_IDENTIFICATION: u32 = 0x9F1C;
/// Interface Device (IFD) Serial Number
pub const IFD_SERIAL_NUMBER: u32 = 0x9F1E;
/// Transaction Time (HHMMSS)
pub const TRANSACTION_TIME: u32 = 0x9F21;
/// Upper Consecutive Offline Limit
pub const UPPER_CONSECUTIVE_OFFLINE_LIMIT: u32 = 0x9F23;
/// Application Cryptogram
pub const APPLICATION_CRYPTOGRAM: u32 = 0x9F26;
/// Cryptogram Information Data
pub const CRYPTOGRAM_INFORMATION_DATA: u32 = 0x9F27;
/// Issuer Public Key Exponent
pub const ISSUER_PUBLIC_KEY_EXPONENT: u32 = 0x9F32;
/// Terminal Capabilities
pub const TERMINAL_CAPABILITIES: u32 = 0x9F33;
/// Cardholder Verification Method (CVM) Results
pub const CVM_RESULTS: u32 = 0x9F34;
/// Terminal Type
pub const TERMINAL_TYPE: u32 = 0x9F35;
/// Application Transaction Counter (ATC)
pub const ATC: u32 = 0x9F36;
/// Unpredictable Number
pub const UNPREDICTABLE_NUMBER: u32 = 0x9F37;
/// Processing Options Data Object List (PDOL)
pub const PDOL: u32 = 0x9F38;
/// Point-of-Service (POS) Entry Mode
pub const POS_ENTRY_MODE: u32 = 0x9F39;
/// Additional Terminal Capabilities
pub const ADDITIONAL_TERMINAL_CAPABILITIES: u32 = 0x9F40;
/// Transaction Sequence Counter
pub const TRANSACTION_SEQUENCE_COUNTER: u32 = 0x9F41;
/// Application Currency Code
pub const APPLICATION_CURRENCY_CODE: u32 = 0x9F42;
/// Application Currency Exponent
pub const APPLICATION_CURRENCY_EXPONENT: u32 = 0x9F44;
/// Data Authentication Code
pub const DATA_AUTHENTICATION_CODE: u32 = 0x9F45;
/// ICC Public Key Certificate
pub const ICC_PUBLIC_KEY_CERTIFICATE: u32 = 0x9F46;
/// ICC Public Key Exponent
pub const ICC_PUBLIC_KEY_EXPONENT: u32 = 0x9F47;
/// ICC Public Key Remainder
pub const ICC_PUBLIC_KEY_REMAINDER: u32 = 0x9F48;
/// Dynamic Data Authentication Data Object List (DDOL)
pub const DDOL: u32 = 0x9F49;
/// Static Data Authentication Tag List
pub const SDA_TAG_LIST: u32 = 0x9F4A;
/// Signed Dynamic Application Data
pub const SIGNED_DYNAMIC_APPLICATION_DATA: u32 = 0x9F4B;
/// ICC Dynamic Number
pub const ICC_DYNAMIC_NUMBER: u32 = 0x9F4C;
/// Log Entry
pub const LOG_ENTRY: u32 = 0x9F4D;
/// FCI Proprietary Template
pub const FCI_PROPRIETARY_TEMPLATE: u32 = 0xA5;
/// FCI Issuer Discretionary Data
pub const FCI_ISSUER_DISCRETIONARY_DATA: u32 = 0xBF0C;

/// Terminal-only configuration values without an EMV assigned tag
///
/// These live in the proprietary `DF81xx` range and never leave the terminal.
pub mod proprietary {
    /// Threshold Value for Biased Random Selection (binary, 4 bytes)
    pub const RANDOM_SELECTION_THRESHOLD: u32 = 0xDF8101;
    /// Target Percentage to be Used for Random Selection (binary, 1 byte, 0-99)
    pub const RANDOM_SELECTION_TARGET_PERCENTAGE: u32 = 0xDF8102;
    /// Maximum Target Percentage to be Used for Biased Random Selection (binary, 1 byte, 0-99)
    pub const RANDOM_SELECTION_MAX_TARGET_PERCENTAGE: u32 = 0xDF8103;
    /// Terminal Action Code - Default
    pub const TAC_DEFAULT: u32 = 0xDF8104;
    /// Terminal Action Code - Denial
    pub const TAC_DENIAL: u32 = 0xDF8105;
    /// Terminal Action Code - Online
    pub const TAC_ONLINE: u32 = 0xDF8106;
    /// Default Dynamic Data Authentication Data Object List
    pub const DEFAULT_DDOL: u32 = 0xDF8107;
}

/// Data format of a field, as far as DOL padding and truncation are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FieldFormat {
    /// Numeric (`n`): BCD, right justified, padded with leading zeros
    #[display("n")]
    Numeric,
    /// Compressed numeric (`cn`): BCD, left justified, padded with trailing `F`
    #[display("cn")]
    CompressedNumeric,
    /// Anything else (`b`, `an`, `ans`): left justified, padded with trailing zeros
    #[display("b")]
    Binary,
}

/// Data format of a tag
pub const fn format_of(tag: u32) -> FieldFormat {
    match tag {
        PAN => FieldFormat::CompressedNumeric,
        APPLICATION_EXPIRATION_DATE
        | APPLICATION_EFFECTIVE_DATE
        | ISSUER_COUNTRY_CODE
        | TRANSACTION_CURRENCY_CODE
        | SERVICE_CODE
        | PAN_SEQUENCE_NUMBER
        | TRANSACTION_CURRENCY_EXPONENT
        | TRANSACTION_DATE
        | TRANSACTION_TYPE
        | AMOUNT_AUTHORISED_NUMERIC
        | AMOUNT_OTHER_NUMERIC
        | ISSUER_CODE_TABLE_INDEX
        | MERCHANT_CATEGORY_CODE
        | TERMINAL_COUNTRY_CODE
        | TRANSACTION_TIME
        | TERMINAL_TYPE
        | POS_ENTRY_MODE
        | TRANSACTION_SEQUENCE_COUNTER
        | APPLICATION_CURRENCY_CODE
        | APPLICATION_CURRENCY_EXPONENT => FieldFormat::Numeric,
        _ => FieldFormat::Binary,
    }
}
