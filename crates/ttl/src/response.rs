//! R-APDU definition

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TtlError;
use crate::status::StatusWord;

/// A complete R-APDU after the transport layer resolved every
/// GET RESPONSE and Le correction round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Create a response without data
    pub fn status_only(status: impl Into<StatusWord>) -> Self {
        Self::new(Bytes::new(), status)
    }

    /// Parse from raw bytes ending in SW1 SW2
    pub fn from_bytes(data: &[u8]) -> Result<Self, TtlError> {
        let split = data
            .len()
            .checked_sub(2)
            .ok_or(TtlError::InvalidResponseLength(data.len()))?;
        let (payload, sw) = data.split_at(split);
        Ok(Self::new(
            Bytes::copy_from_slice(payload),
            StatusWord::new(sw[0], sw[1]),
        ))
    }

    /// Response data without the status word
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Response data as shared bytes
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is 90 00
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.payload.len() + 2);
        buf.put_slice(&response.payload);
        buf.put_u8(response.status.sw1);
        buf.put_u8(response.status.sw2);
        buf.freeze()
    }
}
