//! PC/SC card reader transport for the EMV kernel
//!
//! This crate implements the `CardTransport` trait from `nexum-emv-ttl` on
//! top of the PC/SC API. The reader driver performs the T=0/T=1 framing, so
//! the transport layer is used in APDU mode.
//!
//! # Examples
//!
//! ```no_run
//! use nexum_emv_transport_pcsc::{PcscConfig, PcscDeviceManager};
//! use nexum_emv_ttl::{TransportMode, Ttl};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PcscDeviceManager::new()?;
//! for reader in manager.list_readers()? {
//!     println!("{}: card present {}", reader.name(), reader.has_card());
//! }
//!
//! let transport = manager.open_first_card(PcscConfig::default())?;
//! let mut ttl = Ttl::new(transport, TransportMode::Apdu);
//! # let _ = &mut ttl;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export pcsc types used in the configuration
pub use pcsc::Protocols;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{PcscConfig, PcscDeviceManager, PcscError, PcscReader, PcscTransport, ShareMode};
}
