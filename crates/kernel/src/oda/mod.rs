//! Offline data authentication
//!
//! [`OdaContext`] collects what the authentication methods hash while the
//! transaction runs: the records flagged by the AFL, the PDOL and CDOL1 data
//! sent to the card and the GENERATE AC response. [`cert`] recovers the
//! certificate chain and signed data; [`RsaKey`] does the raw RSA recovery.

use derive_more::Display;
use nexum_emv_ttl::command::{MAX_COMMAND_DATA_LEN, MAX_RESPONSE_DATA_LEN};

pub mod cert;
mod rsa;

pub use rsa::RsaKey;

/// Capacity of the static data buffer filled from AFL records
pub const MAX_RECORD_DATA_LEN: usize = 2048;

/// Errors raised while authenticating card data
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OdaError {
    /// A hash input buffer is full
    #[error("ODA buffer capacity exceeded")]
    BufferOverflow,

    /// No Certification Authority public key for the RID and index
    #[error("CA public key not found")]
    CaKeyNotFound,

    /// A public key has an unusable modulus or exponent
    #[error("Invalid public key")]
    InvalidKey,

    /// Signed data does not match the key length
    #[error("Signed data length {actual} does not match key length {expected}")]
    KeyLengthMismatch {
        /// Key length
        expected: usize,
        /// Signed data length
        actual: usize,
    },

    /// Recovered data is not framed or formatted as expected
    #[error("Invalid recovered data: {0}")]
    InvalidFormat(&'static str),

    /// The recovered hash does not match the data
    #[error("Hash mismatch")]
    HashMismatch,

    /// A certificate has expired
    #[error("Certificate expired")]
    CertificateExpired,

    /// Data required for authentication is missing from the card
    #[error("Missing data: {0}")]
    MissingData(&'static str),
}

/// Offline data authentication method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum OdaMethod {
    /// No method is mutually supported
    #[default]
    #[display("none")]
    None,
    /// Static data authentication
    #[display("SDA")]
    Sda,
    /// Dynamic data authentication
    #[display("DDA")]
    Dda,
    /// Combined DDA/application cryptogram generation
    #[display("CDA")]
    Cda,
    /// Extended data authentication
    #[display("XDA")]
    Xda,
}

/// Per transaction offline data authentication state
#[derive(Debug, Clone)]
pub struct OdaContext {
    method: OdaMethod,
    records: Vec<u8>,
    records_valid: bool,
    pdol_data: Vec<u8>,
    cdol1_data: Vec<u8>,
    genac_data: Vec<u8>,
    icc_key: Option<RsaKey>,
}

impl OdaContext {
    /// Create an empty context
    pub const fn new() -> Self {
        Self {
            method: OdaMethod::None,
            records: Vec::new(),
            records_valid: true,
            pdol_data: Vec::new(),
            cdol1_data: Vec::new(),
            genac_data: Vec::new(),
            icc_key: None,
        }
    }

    /// Selected method
    pub const fn method(&self) -> OdaMethod {
        self.method
    }

    pub(crate) const fn set_method(&mut self, method: OdaMethod) {
        self.method = method;
    }

    /// Record data to be authenticated, in AFL order
    pub fn records(&self) -> &[u8] {
        &self.records
    }

    /// Append record data to be authenticated
    pub fn append_record(&mut self, data: &[u8]) -> Result<(), OdaError> {
        append_capped(&mut self.records, data, MAX_RECORD_DATA_LEN)
    }

    /// Whether every record flagged for authentication was usable
    pub const fn records_valid(&self) -> bool {
        self.records_valid
    }

    pub(crate) const fn invalidate_records(&mut self) {
        self.records_valid = false;
    }

    /// PDOL related data sent with GET PROCESSING OPTIONS
    pub fn pdol_data(&self) -> &[u8] {
        &self.pdol_data
    }

    pub(crate) fn set_pdol_data(&mut self, data: &[u8]) -> Result<(), OdaError> {
        self.pdol_data.clear();
        append_capped(&mut self.pdol_data, data, MAX_COMMAND_DATA_LEN)
    }

    /// CDOL1 related data sent with the first GENERATE AC
    pub fn cdol1_data(&self) -> &[u8] {
        &self.cdol1_data
    }

    pub(crate) fn set_cdol1_data(&mut self, data: &[u8]) -> Result<(), OdaError> {
        self.cdol1_data.clear();
        append_capped(&mut self.cdol1_data, data, MAX_COMMAND_DATA_LEN)
    }

    /// GENERATE AC response data objects, excluding the Signed Dynamic Application Data
    pub fn genac_data(&self) -> &[u8] {
        &self.genac_data
    }

    pub(crate) fn set_genac_data(&mut self, data: &[u8]) -> Result<(), OdaError> {
        self.genac_data.clear();
        append_capped(&mut self.genac_data, data, MAX_RESPONSE_DATA_LEN)
    }

    /// ICC public key recovered for CDA
    pub const fn icc_key(&self) -> Option<&RsaKey> {
        self.icc_key.as_ref()
    }

    pub(crate) fn set_icc_key(&mut self, key: RsaKey) {
        self.icc_key = Some(key);
    }

    /// Transaction Data Hash Code input for CDA
    pub fn transaction_data_hash(&self) -> [u8; 20] {
        cert::sha1(&[&self.pdol_data, &self.cdol1_data, &self.genac_data])
    }

    /// Drop everything collected for the current transaction
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for OdaContext {
    fn default() -> Self {
        Self::new()
    }
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], capacity: usize) -> Result<(), OdaError> {
    if buf.len() + data.len() > capacity {
        return Err(OdaError::BufferOverflow);
    }
    buf.extend_from_slice(data);
    Ok(())
}
