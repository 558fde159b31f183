//! Error types for the PC/SC transport

use nexum_emv_ttl::TransportError;

/// PC/SC specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(error) => transport_error(error),
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) | PcscError::NoCard(_) => {
                Self::Connection
            }
        }
    }
}

fn transport_error(error: pcsc::Error) -> TransportError {
    use pcsc::Error;
    match error {
        Error::RemovedCard | Error::NoSmartcard => TransportError::CardRemoved,
        Error::Timeout => TransportError::Timeout,
        Error::UnknownReader | Error::ReaderUnavailable | Error::NoReadersAvailable => {
            TransportError::Connection
        }
        Error::CommError | Error::ResetCard | Error::UnpoweredCard | Error::UnresponsiveCard => {
            TransportError::Transmission
        }
        // Driver codes are 32 bit SCARD_* values
        error => TransportError::Driver(error as u32 as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_mapping() {
        assert!(matches!(
            TransportError::from(PcscError::from(pcsc::Error::RemovedCard)),
            TransportError::CardRemoved
        ));
        assert!(matches!(
            TransportError::from(PcscError::from(pcsc::Error::Timeout)),
            TransportError::Timeout
        ));
        assert!(matches!(
            TransportError::from(PcscError::from(pcsc::Error::ResetCard)),
            TransportError::Transmission
        ));
        assert!(matches!(
            TransportError::from(PcscError::NoCard("Reader 0".into())),
            TransportError::Connection
        ));
        assert!(matches!(
            TransportError::from(PcscError::from(pcsc::Error::SharingViolation)),
            TransportError::Driver(code) if code as u32 == 0x8010_000B
        ));
    }
}
