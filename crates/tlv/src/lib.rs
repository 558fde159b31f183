//! BER-TLV primitives for EMV processing
//!
//! This crate provides the data containers every other layer of the EMV kernel
//! is built on:
//!
//! - [`ber`]: ISO/IEC 8825-1 BER-TLV decoding and encoding (definite length only)
//! - [`TlvList`]: an ordered, owning list of TLV entries where insertion order matters
//! - [`dol`]: Data Object List processing used to build command data
//! - [`tags`]: the EMV tag catalogue and the data format of each tag
//! - [`format`]: helpers for numeric (BCD) fields and dates
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod ber;
pub mod dol;
mod error;
pub mod format;
mod list;
pub mod tags;

pub use error::TlvError;
pub use list::{TlvEntry, TlvFlags, TlvList};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        TlvEntry, TlvError, TlvFlags, TlvList,
        ber::{self, BerTlv},
        dol::{self, DolEntry},
        format::{self, EmvDate},
        tags,
    };
}
