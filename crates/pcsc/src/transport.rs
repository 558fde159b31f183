//! PC/SC transport implementation
//!
//! The reader driver handles T=0 procedure bytes itself, so this transport
//! is used with [`TransportMode::Apdu`](nexum_emv_ttl::TransportMode::Apdu).

use std::ffi::CString;
use std::fmt;

use bytes::Bytes;
use nexum_emv_ttl::CardTransport;
use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE};
use tracing::{debug, warn};

use crate::config::PcscConfig;
use crate::error::PcscError;

/// Card transport over a PC/SC reader
pub struct PcscTransport {
    context: Context,
    card: Option<Card>,
    reader_name: String,
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    /// Create a transport for `reader_name` and try to connect to its card
    pub(crate) fn new(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let mut transport = Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            config,
        };

        // A missing card is reported by the first exchange
        if let Err(error) = transport.connect_card() {
            debug!(reader = reader_name, %error, "No card connection yet");
        }
        Ok(transport)
    }

    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }
        let reader = CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        match self
            .context
            .connect(&reader, self.config.share_mode.into(), self.config.protocols)
        {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard) => Err(PcscError::NoCard(self.reader_name.clone())),
            Err(pcsc::Error::UnknownReader) => {
                Err(PcscError::ReaderNotFound(self.reader_name.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Answer To Reset of the connected card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;
        Ok(card.get_attribute_owned(pcsc::Attribute::AtrString)?)
    }

    /// Reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    fn transmit_command(&mut self, command: &[u8], retry: bool) -> Result<Bytes, PcscError> {
        self.connect_card()?;
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;

        let mut buffer = [0u8; MAX_BUFFER_SIZE];
        match card.transmit(command, &mut buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(error @ (pcsc::Error::ResetCard | pcsc::Error::RemovedCard)) => {
                warn!(reader = %self.reader_name, %error, "Card connection lost");
                self.card = None;
                if retry && self.config.auto_reconnect && error == pcsc::Error::ResetCard {
                    return self.transmit_command(command, false);
                }
                Err(error.into())
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl CardTransport for PcscTransport {
    type Error = PcscError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.transmit_command(command, true)
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        if let Some(card) = self.card.take() {
            if let Err((_, error)) = card.disconnect(Disposition::ResetCard) {
                debug!(%error, "Disconnect with reset failed");
            }
        }
        self.connect_card()
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}
