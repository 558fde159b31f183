//! Kernel pipeline
//!
//! A transaction is a [`Kernel`] moving through a fixed sequence of states:
//!
//! ```text
//! Discovery -> Selected -> Initiated -> DataRead -> Authenticated
//!     -> RestrictionsChecked -> RiskManaged -> ActionAnalyzed
//! ```
//!
//! Every stage consumes the kernel and returns it in the next state, so a
//! stage cannot run out of order. Stages that may leave the candidate list
//! usable (application selection and GET PROCESSING OPTIONS) fail with a
//! [`Retry`] that hands the kernel back in the [`Discovery`] state.

use std::fmt;

use nexum_emv_tlv::{TlvList, format, tags};
use tracing::debug;

use crate::app::{Candidate, CandidateList};
use crate::context::EmvContext;
use crate::error::{Error, Outcome, Termination};
use crate::fields::{Bit, set_bit};
use crate::tal::{TalError, TalFailure};

mod action;
mod gpo;
mod oda;
mod read;
mod restrictions;
mod risk;
mod selection;

pub use nexum_emv_ttl::commands::CryptogramType;

/// A transaction in progress, in state `S`
pub struct Kernel<'c, T, S> {
    ctx: &'c mut EmvContext<T>,
    state: S,
}

impl<'c, T, S> Kernel<'c, T, S> {
    pub(crate) const fn new(ctx: &'c mut EmvContext<T>, state: S) -> Self {
        Self { ctx, state }
    }

    fn advance<N>(self, state: N) -> Kernel<'c, T, N> {
        Kernel {
            ctx: self.ctx,
            state,
        }
    }

    /// Transaction context
    pub fn context(&self) -> &EmvContext<T> {
        self.ctx
    }

    /// Current state
    pub const fn state(&self) -> &S {
        &self.state
    }
}

impl<T, S: fmt::Debug> fmt::Debug for Kernel<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state)
            .field("icc", &self.ctx.icc.len())
            .field("terminal", &self.ctx.terminal.len())
            .finish()
    }
}

/// Candidate discovery and application selection
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub(crate) candidates: CandidateList,
}

/// An application was selected; its FCI is held until GET PROCESSING OPTIONS
#[derive(Debug, Clone)]
pub struct Selected {
    candidates: CandidateList,
    application: Candidate,
    fci: TlvList,
}

impl Selected {
    /// File Control Information returned by SELECT
    pub const fn fci(&self) -> &TlvList {
        &self.fci
    }
}

/// GET PROCESSING OPTIONS succeeded
#[derive(Debug, Clone)]
pub struct Initiated {
    application: Candidate,
}

/// Every AFL record was read
#[derive(Debug, Clone)]
pub struct DataRead {
    application: Candidate,
}

/// Offline data authentication was performed or recorded as not performed
#[derive(Debug, Clone)]
pub struct Authenticated {
    application: Candidate,
}

/// Processing restrictions were checked
#[derive(Debug, Clone)]
pub struct RestrictionsChecked {
    application: Candidate,
}

/// Terminal risk management was performed
#[derive(Debug, Clone)]
pub struct RiskManaged {
    application: Candidate,
}

/// The card answered the first GENERATE AC
#[derive(Debug, Clone)]
pub struct ActionAnalyzed {
    application: Candidate,
    requested: CryptogramType,
    cryptogram: CryptogramType,
    outcome: Outcome,
}

impl ActionAnalyzed {
    /// Cryptogram requested by terminal action analysis
    pub const fn requested(&self) -> CryptogramType {
        self.requested
    }

    /// Cryptogram returned by the card
    pub const fn cryptogram(&self) -> CryptogramType {
        self.cryptogram
    }

    /// Transaction outcome
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }
}

macro_rules! impl_application {
    ($($state:ty),+ $(,)?) => {
        $(
            impl $state {
                /// The selected application
                pub const fn application(&self) -> &Candidate {
                    &self.application
                }
            }
        )+
    };
}

impl_application!(
    Selected,
    Initiated,
    DataRead,
    Authenticated,
    RestrictionsChecked,
    RiskManaged,
    ActionAnalyzed,
);

/// A stage failed with the candidate list still available
///
/// When the reason is retryable the caller may select another candidate from
/// [`Retry::into_kernel`]. Converting into a [`Termination`] ends the
/// transaction with the reason.
pub struct Retry<'c, T> {
    kernel: Kernel<'c, T, Discovery>,
    reason: Termination,
}

impl<'c, T> Retry<'c, T> {
    /// A retryable outcome with no candidate left becomes
    /// [`Outcome::NotAccepted`]
    pub(crate) fn new(kernel: Kernel<'c, T, Discovery>, reason: Termination) -> Self {
        let reason = match reason.outcome() {
            Some(Outcome::TryAgain | Outcome::GpoNotAccepted)
                if kernel.state.candidates.is_empty() =>
            {
                debug!("No candidate left to retry");
                Outcome::NotAccepted.into()
            }
            _ => reason,
        };
        Self { kernel, reason }
    }

    /// Whether another candidate may be selected
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.reason,
            Termination::Outcome(Outcome::TryAgain | Outcome::GpoNotAccepted)
        )
    }

    /// Why the stage failed
    pub const fn reason(&self) -> &Termination {
        &self.reason
    }

    /// The kernel, back in candidate selection
    pub fn into_kernel(self) -> Kernel<'c, T, Discovery> {
        self.kernel
    }

    /// The failure reason, dropping the kernel
    pub fn into_reason(self) -> Termination {
        self.reason
    }
}

impl<T> fmt::Debug for Retry<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("reason", &self.reason)
            .field("candidates", &self.kernel.state.candidates.len())
            .finish()
    }
}

impl<T> fmt::Display for Retry<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T> From<Retry<'_, T>> for Termination {
    fn from(retry: Retry<'_, T>) -> Self {
        retry.reason
    }
}

/// Map a card command failure: session ending errors propagate, a blocked
/// card is [`Outcome::CardBlocked`] and command results become `outcome`
fn tal_failure(failure: TalFailure, outcome: Outcome) -> Termination {
    match failure {
        TalFailure::Error(TalError::CardBlocked) => Outcome::CardBlocked.into(),
        TalFailure::Error(error) => error.into(),
        TalFailure::Result(result) => {
            debug!(%result, %outcome, "Card command result");
            outcome.into()
        }
    }
}

/// Set a Terminal Verification Results bit
fn set_tvr(terminal: &mut TlvList, bit: Bit) -> Result<(), Error> {
    set_bit(terminal, tags::TVR, bit)
}

/// Set a Transaction Status Information bit
fn set_tsi(terminal: &mut TlvList, bit: Bit) -> Result<(), Error> {
    set_bit(terminal, tags::TSI, bit)
}

/// Transaction date (`9A`) supplied with the transaction parameters
fn transaction_date(params: &TlvList) -> Result<format::EmvDate, Error> {
    let date = params
        .value(tags::TRANSACTION_DATE)
        .ok_or(Error::InvalidParameter)?;
    format::EmvDate::from_yymmdd(date).map_err(|_| Error::InvalidParameter)
}

/// Fixed length terminal data element (`9F33`, `9F35`, `9F40`, ...) from the
/// configuration list, which holds the only copy the kernel reads
fn terminal_data<const N: usize>(config: &TlvList, tag: u32) -> Result<[u8; N], Error> {
    config
        .value(tag)
        .and_then(|value| <[u8; N]>::try_from(value).ok())
        .ok_or(Error::InvalidConfig("terminal data element missing or malformed"))
}
