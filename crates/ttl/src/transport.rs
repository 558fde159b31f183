//! Card transport abstraction
//!
//! A transport moves raw bytes to and from the card. It does not interpret
//! command structure, procedure bytes or status words; that is the job of
//! [`Ttl`](crate::Ttl).

use std::fmt;

use bytes::Bytes;
use derive_more::Display;
use tracing::{debug, trace};

use crate::error::TransportError;

/// Framing used by the reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum TransportMode {
    /// The reader exchanges complete C-APDUs and R-APDUs (PC/SC style)
    #[default]
    #[display("APDU")]
    Apdu,
    /// The reader exchanges raw T=0 TPDUs, procedure bytes included
    #[display("TPDU")]
    Tpdu,
}

/// Trait for card transports
pub trait CardTransport: Send + Sync + fmt::Debug {
    /// Error type returned by the transport
    type Error: Into<TransportError> + fmt::Debug;

    /// Send raw bytes to the card and return whatever the card answered
    ///
    /// In TPDU mode an empty `command` means "receive only", used while the
    /// card keeps sending NULL procedure bytes.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Exchange implementation, called by [`CardTransport::transmit_raw`]
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error>;

    /// Whether a card is connected
    fn is_connected(&self) -> bool;

    /// Reset the card connection
    fn reset(&mut self) -> Result<(), Self::Error>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    type Error = T::Error;

    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).transmit_raw(command)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        (**self).reset()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    /// Expected command and scripted answer, consumed in order
    pub(crate) script: std::collections::VecDeque<(Bytes, Bytes)>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
}

#[cfg(test)]
impl MockTransport {
    pub(crate) fn new(script: &[(&[u8], &[u8])]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(c, r)| (Bytes::copy_from_slice(c), Bytes::copy_from_slice(r)))
                .collect(),
            commands: Vec::new(),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.commands.push(Bytes::copy_from_slice(command));
        let (expected, response) = self.script.pop_front().ok_or(TransportError::Transmission)?;
        assert_eq!(
            hex::encode_upper(command),
            hex::encode_upper(&expected),
            "unexpected command"
        );
        Ok(response)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.commands.clear();
        Ok(())
    }
}
