//! EMV contact kernel
//!
//! This crate drives a contact card through an EMV transaction on top of
//! the transport layer in `nexum-emv-ttl`:
//!
//! - [`tal`]: the card commands with their responses parsed into TLV lists
//! - [`EmvContext`]: the card session, terminal configuration and the TLV
//!   lists of the transaction in progress
//! - [`Kernel`]: the transaction pipeline, one type state per stage
//! - [`oda`]: offline data authentication state and certificate recovery
//! - [`TxnLogEntry`]: the transaction log used by terminal risk management
//!
//! ```no_run
//! use nexum_emv_kernel::prelude::*;
//!
//! fn run<T: CardTransport>(transport: T, params: TlvList) -> Result<Outcome, Termination> {
//!     let config = KernelConfig::new()
//!         .with_supported_aid(vec![0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10], false);
//!     let mut ctx = EmvContext::new(transport, config)?;
//!     let mut kernel = ctx.begin(params);
//!     kernel.build_candidate_list()?;
//!     let kernel = kernel
//!         .select_application(0)?
//!         .initiate()?
//!         .read_application_data()?
//!         .authenticate()?
//!         .check_restrictions()?
//!         .manage_risk(&[])?
//!         .analyze_card_action()?;
//!     Ok(kernel.state().outcome())
//! }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod app;
pub mod capk;
pub mod config;
mod context;
mod error;
pub mod fields;
mod kernel;
pub mod oda;
pub mod tal;
pub mod txn_log;

#[cfg(test)]
mod test_utils;

pub use app::{Candidate, CandidateList};
pub use capk::CaPublicKey;
pub use config::{KernelConfig, RandomSelection, SupportedAid};
pub use context::EmvContext;
pub use error::{Error, Outcome, Result, Termination};
pub use kernel::{
    ActionAnalyzed, Authenticated, CryptogramType, DataRead, Discovery, Initiated, Kernel,
    RestrictionsChecked, Retry, RiskManaged, Selected,
};
pub use oda::{OdaContext, OdaMethod};
pub use tal::{Tal, TalError, TalFailure, TalResult};
pub use txn_log::TxnLogEntry;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        ActionAnalyzed, CaPublicKey, Candidate, CryptogramType, EmvContext, Error, Kernel,
        KernelConfig, OdaMethod, Outcome, RandomSelection, Retry, Termination, TxnLogEntry,
    };
    pub use nexum_emv_tlv::{TlvFlags, TlvList, tags};
    pub use nexum_emv_ttl::{CardTransport, TransportMode};
}
