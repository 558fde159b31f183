//! Scripted card used by unit tests

use std::collections::VecDeque;

use nexum_emv_tlv::{TlvFlags, TlvList, tags};
use nexum_emv_ttl::{Bytes, CardTransport, TransportError, TransportMode, Ttl};

use crate::app::Candidate;
use crate::config::KernelConfig;
use crate::context::EmvContext;
use crate::fields::{tsi, tvr, zeroed_register};
use crate::oda::cert;
use crate::tal::Tal;

/// Card that checks every C-APDU against a script and replays the answers
#[derive(Debug, Default)]
pub(crate) struct ScriptedCard {
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
}

impl ScriptedCard {
    pub(crate) fn new(script: &[(&[u8], &[u8])]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(c, r)| (c.to_vec(), r.to_vec()))
                .collect(),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

impl CardTransport for ScriptedCard {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        let (expected, response) = self
            .script
            .pop_front()
            .ok_or_else(|| TransportError::other("script exhausted"))?;
        assert_eq!(
            hex::encode_upper(command),
            hex::encode_upper(expected),
            "terminal sent unexpected command"
        );
        Ok(Bytes::from(response))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn tal(script: &[(&[u8], &[u8])]) -> Tal<ScriptedCard> {
    init_tracing();
    Tal::new(Ttl::new(ScriptedCard::new(script), TransportMode::Apdu))
}

/// Context over a scripted card with a fixed random seed
pub(crate) fn context(script: &[(&[u8], &[u8])], settings: KernelConfig) -> EmvContext<ScriptedCard> {
    init_tracing();
    EmvContext::new(ScriptedCard::new(script), settings)
        .unwrap()
        .with_seed(1)
}

/// Candidate built from an ADF name alone
pub(crate) fn candidate(aid: &[u8]) -> Candidate {
    let mut data = TlvList::new();
    data.push(tags::AID, aid, TlvFlags::NONE).unwrap();
    Candidate::from_tlv(data, &[0; 5]).unwrap()
}

/// Terminal list as left by GET PROCESSING OPTIONS, with zeroed TSI and TVR
pub(crate) fn terminal_registers() -> TlvList {
    let mut terminal = TlvList::new();
    terminal.push_entry(zeroed_register(tags::TSI, tsi::LEN).unwrap());
    terminal.push_entry(zeroed_register(tags::TVR, tvr::LEN).unwrap());
    terminal
        .push(tags::UNPREDICTABLE_NUMBER, [0x11, 0x22, 0x33, 0x44], TlvFlags::NONE)
        .unwrap();
    terminal
}

/// Frame `body`, from the format byte onward, as signed by an identity key
/// of `len` bytes (modulus all `FF`, exponent `01`)
pub(crate) fn signed_block(body: &[u8], len: usize, extra: &[&[u8]]) -> Vec<u8> {
    let mut block = vec![0x6A];
    block.extend_from_slice(body);
    block.resize(len - 21, 0xBB);
    let mut parts: Vec<&[u8]> = vec![&block[1..]];
    parts.extend_from_slice(extra);
    let hash = cert::sha1(&parts);
    block.extend_from_slice(&hash);
    block.push(0xBC);
    block
}
