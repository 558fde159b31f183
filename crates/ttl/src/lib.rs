//! EMV terminal transport layer
//!
//! This crate turns logical card commands into the exchanges a contact card
//! reader performs, following EMV Book 1 section 9 and Annex A:
//!
//! - [`CardTransport`]: the byte level reader abstraction
//! - [`Ttl`]: the APDU/TPDU state machine handling procedure bytes, `61xx`
//!   and `6Cxx` status words and case 4 warnings
//! - [`Command`], [`Response`] and [`StatusWord`]: C-APDU and R-APDU types
//! - [`commands`]: builders for the EMV card commands
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod commands;
mod error;
mod response;
pub mod status;
mod transport;
mod ttl;

pub use command::{ApduCase, Command};
pub use error::{CommandError, TransportError, TtlError};
pub use response::Response;
pub use status::StatusWord;
pub use transport::{CardTransport, TransportMode};
pub use ttl::{DEFAULT_MAX_ROUNDS, Ttl};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        ApduCase, Bytes, BytesMut, CardTransport, Command, CommandError, Response, StatusWord,
        TransportError, TransportMode, Ttl, TtlError,
        commands::{self, CryptogramType, SelectOccurrence},
        status::common,
    };
}
