//! Device manager for PC/SC readers

use pcsc::{Context, ReaderState, Scope, State};
use tracing::{debug, instrument};

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::PcscReader;
use crate::transport::PcscTransport;

/// Entry point to the PC/SC service: lists readers and opens transports
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    context: Context,
}

impl PcscDeviceManager {
    /// Establish a user scope PC/SC context
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List every reader with its card state
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let names = match self.context.list_readers_owned() {
            Ok(names) => names,
            Err(pcsc::Error::NoReadersAvailable) => return Err(PcscError::NoReadersAvailable),
            Err(error) => return Err(error.into()),
        };
        if names.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut readers = Vec::with_capacity(names.len());
        for name in names {
            let mut states = [ReaderState::new(name.as_c_str(), State::UNAWARE)];
            match self.context.get_status_change(None, &mut states) {
                Ok(()) => readers.push(PcscReader::from_reader_state(&states[0])),
                Err(error) => {
                    debug!(reader = %name.to_string_lossy(), %error, "Reader status unavailable");
                    readers.push(PcscReader::new(name.to_string_lossy().into_owned(), None));
                }
            }
        }
        Ok(readers)
    }

    /// Open a transport to `reader_name` with the default configuration
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport, PcscError> {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open a transport to `reader_name`
    #[instrument(skip(self, config))]
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        PcscTransport::new(self.context.clone(), reader_name, config)
    }

    /// Open a transport to the first reader holding a card
    pub fn open_first_card(&self, config: PcscConfig) -> Result<PcscTransport, PcscError> {
        let reader = self
            .list_readers()?
            .into_iter()
            .find(PcscReader::has_card)
            .ok_or_else(|| PcscError::NoCard("any reader".into()))?;
        self.open_reader_with_config(reader.name(), config)
    }
}
