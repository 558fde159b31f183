//! Reader representation for PC/SC devices

use pcsc::{ReaderState, State};

/// A PC/SC card reader and the card it holds, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Create a reader entry
    pub const fn new(name: String, atr: Option<Vec<u8>>) -> Self {
        Self { name, atr }
    }

    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a card is present in the reader
    pub const fn has_card(&self) -> bool {
        self.atr.is_some()
    }

    /// Answer To Reset of the card, if present
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    pub(crate) fn from_reader_state(state: &ReaderState) -> Self {
        let event = state.event_state();
        let present = event.contains(State::PRESENT) && !event.contains(State::EMPTY);
        Self {
            name: state.name().to_string_lossy().into_owned(),
            atr: present.then(|| state.atr().to_vec()),
        }
    }
}
