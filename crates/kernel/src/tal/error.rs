//! Card command layer errors and results

use derive_more::Display;
use nexum_emv_tlv::TlvError;
use nexum_emv_ttl::{CommandError, StatusWord, TtlError};

use crate::oda::OdaError;

/// Failures that end the card session
#[derive(Debug, thiserror::Error)]
pub enum TalError {
    /// Transport layer failure
    #[error(transparent)]
    Ttl(#[from] TtlError),

    /// Command could not be built
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Card response is not valid BER-TLV
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Offline data authentication buffer failure
    #[error(transparent)]
    Oda(#[from] OdaError),

    /// The card reports that it is blocked
    #[error("Card blocked")]
    CardBlocked,

    /// Card response is well formed BER-TLV but not what the command returns
    #[error("Unexpected response: {0}")]
    Parse(&'static str),
}

/// Command results that leave the session usable
///
/// The caller decides how to continue: offer another application, fall back
/// to another discovery method, or stop the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TalResult {
    /// The card has no payment system environment
    #[display("PSE not found")]
    PseNotFound,
    /// Selecting the payment system environment failed
    #[display("PSE selection failed")]
    PseSelectFailed,
    /// The PSE FCI has no usable directory SFI
    #[display("PSE SFI not found")]
    PseSfiNotFound,
    /// A PSE directory record is malformed
    #[display("PSE directory record invalid")]
    PseAefInvalid,
    /// The application does not exist on the card
    #[display("application not found")]
    AppNotFound,
    /// The application is blocked
    #[display("application blocked")]
    AppBlocked,
    /// SELECT returned an unexpected status
    #[display("application selection failed")]
    AppSelectionFailed,
    /// The application FCI is malformed or names another application
    #[display("application FCI invalid")]
    AppFciParseFailed,
    /// GET PROCESSING OPTIONS returned conditions of use not satisfied
    #[display("GPO conditions of use not satisfied")]
    GpoConditionsNotSatisfied,
    /// GET PROCESSING OPTIONS returned another error status
    #[display("GPO failed with {_0}")]
    GpoFailed(StatusWord),
    /// READ RECORD of an AFL record failed
    #[display("READ RECORD failed")]
    ReadRecordFailed,
    /// A record flagged for offline data authentication is not a `70` template
    #[display("ODA record invalid")]
    OdaRecordInvalid,
    /// GET DATA failed or returned another data object
    #[display("GET DATA failed")]
    GetDataFailed,
    /// INTERNAL AUTHENTICATE failed
    #[display("INTERNAL AUTHENTICATE failed")]
    InternalAuthenticateFailed,
    /// GENERATE AC failed
    #[display("GENERATE AC failed")]
    GenacFailed,
}

/// Either a session ending error or a command result
#[derive(Debug, thiserror::Error)]
pub enum TalFailure {
    /// Session ending error
    #[error(transparent)]
    Error(#[from] TalError),

    /// Command result
    #[error("{0}")]
    Result(TalResult),
}

impl From<TalResult> for TalFailure {
    fn from(result: TalResult) -> Self {
        Self::Result(result)
    }
}

impl From<TtlError> for TalFailure {
    fn from(error: TtlError) -> Self {
        Self::Error(error.into())
    }
}

impl From<TlvError> for TalFailure {
    fn from(error: TlvError) -> Self {
        Self::Error(error.into())
    }
}

impl From<CommandError> for TalFailure {
    fn from(error: CommandError) -> Self {
        Self::Error(error.into())
    }
}

impl From<OdaError> for TalFailure {
    fn from(error: OdaError) -> Self {
        Self::Error(error.into())
    }
}
