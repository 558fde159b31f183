//! Kernel errors and processing outcomes
//!
//! A stage either continues, fails with an [`Error`] that ends the card
//! session, or stops the transaction with an EMV defined [`Outcome`].

use derive_more::Display;
use nexum_emv_tlv::TlvError;

use crate::tal::TalError;

/// Errors that end the card session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal inconsistency or programming error
    #[error("Internal error: {0}")]
    Internal(&'static str),

    /// A caller supplied parameter is out of range
    #[error("Invalid parameter")]
    InvalidParameter,

    /// The kernel configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Card command layer failure
    #[error(transparent)]
    Tal(#[from] TalError),

    /// TLV encoding failure
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Malformed or redundant card data
    #[error("Parse error: {0}")]
    Parse(&'static str),

    /// Processing path this kernel does not implement
    #[error("Unimplemented: {0}")]
    Unimplemented(&'static str),
}

/// EMV processing outcomes that stop the current transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Outcome {
    /// The card returned data the kernel cannot accept
    #[display("card error")]
    CardError,
    /// The card or its payment system environment is blocked
    #[display("card blocked")]
    CardBlocked,
    /// No mutually supported application remains
    #[display("not accepted")]
    NotAccepted,
    /// Selection failed; another candidate may be tried
    #[display("try again")]
    TryAgain,
    /// The card refused GET PROCESSING OPTIONS for this application
    #[display("GPO not accepted")]
    GpoNotAccepted,
    /// Offline decline
    #[display("declined")]
    Declined,
}

/// Reason a pipeline stage stopped
#[derive(Debug, thiserror::Error)]
pub enum Termination {
    /// Session ending error
    #[error(transparent)]
    Error(#[from] Error),

    /// Transaction outcome
    #[error("Transaction outcome: {0}")]
    Outcome(Outcome),
}

impl Termination {
    /// The outcome, if this termination is one
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Outcome(outcome) => Some(*outcome),
            Self::Error(_) => None,
        }
    }
}

impl From<Outcome> for Termination {
    fn from(outcome: Outcome) -> Self {
        Self::Outcome(outcome)
    }
}

impl From<TalError> for Termination {
    fn from(error: TalError) -> Self {
        Self::Error(error.into())
    }
}

impl From<TlvError> for Termination {
    fn from(error: TlvError) -> Self {
        Self::Error(error.into())
    }
}

/// Result type for kernel helpers
pub type Result<T, E = Error> = std::result::Result<T, E>;
