//! Simulated card and certificate chain shared by the kernel tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;

use hex_literal::hex;
use nexum_emv_kernel::oda::cert;
use nexum_emv_kernel::{CaPublicKey, EmvContext, KernelConfig};
use nexum_emv_tlv::{TlvFlags, TlvList, format, tags};
use nexum_emv_ttl::{Bytes, CardTransport, TransportError};

pub const AID: [u8; 7] = hex!("A0000000031010");
pub const PAN: [u8; 8] = hex!("4761739001010010");

pub const SELECT_PSE: &[u8] = &hex!("00A404000E315041592E5359532E444446303100");
pub const SELECT_AID: &[u8] = &hex!("00A4040007A0000000031010 00");
pub const FCI: &[u8] = &hex!("6F098407A0000000031010 9000");
pub const GPO: &[u8] = &hex!("80A8000002830000");
pub const NOT_FOUND: &[u8] = &hex!("6A82");

/// Amount, transaction date and transaction type
pub const CDOL1: &[u8] = &hex!("9F0206 9A03 9C01");

const CA_KEY_INDEX: u8 = 0x92;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send + Sync>;

enum Step {
    /// Fixed command and answer
    Exchange { command: Vec<u8>, response: Vec<u8> },
    /// Answer computed from a command starting with `header`
    Respond { header: Vec<u8>, respond: Responder },
}

/// Card that plays a script of exchanges and checks every C-APDU
#[derive(Default)]
pub struct SimulatedCard {
    steps: VecDeque<Step>,
}

impl SimulatedCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(mut self, command: &[u8], response: &[u8]) -> Self {
        self.steps.push_back(Step::Exchange {
            command: command.to_vec(),
            response: response.to_vec(),
        });
        self
    }

    pub fn respond(
        mut self,
        header: &[u8],
        respond: impl FnMut(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.steps.push_back(Step::Respond {
            header: header.to_vec(),
            respond: Box::new(respond),
        });
        self
    }

    /// Exchanges not yet played
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Debug for SimulatedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedCard")
            .field("remaining", &self.steps.len())
            .finish()
    }
}

impl CardTransport for SimulatedCard {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        let step = self
            .steps
            .pop_front()
            .ok_or_else(|| TransportError::other("script exhausted"))?;
        let response = match step {
            Step::Exchange {
                command: expected,
                response,
            } => {
                assert_eq!(
                    hex::encode_upper(command),
                    hex::encode_upper(expected),
                    "terminal sent unexpected command"
                );
                response
            }
            Step::Respond { header, mut respond } => {
                assert!(
                    command.starts_with(&header),
                    "terminal sent {} instead of {}..",
                    hex::encode_upper(command),
                    hex::encode_upper(&header)
                );
                respond(command)
            }
        };
        Ok(Bytes::from(response))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context over `card` with a fixed random seed
pub fn context(card: SimulatedCard, settings: KernelConfig) -> EmvContext<SimulatedCard> {
    init_tracing();
    EmvContext::new(card, settings).unwrap().with_seed(7)
}

/// Identity CA key of 176 bytes: modulus all `FF`, exponent `01`
pub fn ca_key() -> CaPublicKey {
    CaPublicKey::new(hex!("A000000003"), CA_KEY_INDEX, vec![0xFF; 176], [0x01]).unwrap()
}

/// One supported AID, the CA key and a floor limit of 100.00
pub fn settings() -> KernelConfig {
    KernelConfig::new()
        .with_supported_aid(AID, false)
        .with_ca_public_key(ca_key())
        .with_floor_limit(10_000)
}

/// Purchase of `amount` on 15 June 2025
pub fn params(amount: u32) -> TlvList {
    let mut params = TlvList::new();
    params
        .push(tags::TRANSACTION_DATE, hex!("250615"), TlvFlags::NONE)
        .unwrap();
    params
        .push(tags::TRANSACTION_TYPE, [0x00], TlvFlags::NONE)
        .unwrap();
    params
        .push(tags::AMOUNT_AUTHORISED_BINARY, amount.to_be_bytes(), TlvFlags::NONE)
        .unwrap();
    params
        .push(tags::AMOUNT_AUTHORISED_NUMERIC, format::u64_to_bcd(amount.into(), 6), TlvFlags::NONE)
        .unwrap();
    params
        .push(tags::TRANSACTION_CURRENCY_CODE, hex!("0840"), TlvFlags::NONE)
        .unwrap();
    params
}

pub fn tlv(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    match value.len() {
        len @ 0..=0x7F => out.push(len as u8),
        len @ 0x80..=0xFF => out.extend([0x81, len as u8]),
        len => out.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    out.extend_from_slice(value);
    out
}

/// READ RECORD response carrying `content` in a `70` template
pub fn record(content: &[u8]) -> Vec<u8> {
    let mut response = tlv(&[0x70], content);
    response.extend_from_slice(&hex!("9000"));
    response
}

pub fn read_record(sfi: u8, record: u8) -> [u8; 5] {
    [0x00, 0xB2, record, (sfi << 3) | 0x04, 0x00]
}

/// Format 1 GET PROCESSING OPTIONS response
pub fn gpo_response(aip: [u8; 2], afl: &[u8]) -> Vec<u8> {
    let mut value = aip.to_vec();
    value.extend_from_slice(afl);
    let mut response = tlv(&[0x80], &value);
    response.extend_from_slice(&hex!("9000"));
    response
}

/// Data every application record set carries: PAN, expiry, CDOL1, CDOL2
/// and a Static Data Authentication Tag List naming the AIP
pub fn application_data(cdol1: &[u8], extra: &[u8]) -> Vec<u8> {
    [
        tlv(&[0x5A], &PAN),
        tlv(&[0x5F, 0x24], &hex!("261231")),
        tlv(&[0x8C], cdol1),
        tlv(&[0x8D], &hex!("8A02")),
        tlv(&[0x9F, 0x4A], &[0x82]),
        extra.to_vec(),
    ]
    .concat()
}

/// Frame `body`, from the format byte onward, as signed by an identity key
/// of `len` bytes
pub fn signed_block(body: &[u8], len: usize, extra: &[&[u8]]) -> Vec<u8> {
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

/// Issuer key of 128 bytes certified by the CA key
pub fn issuer_certificate() -> Vec<u8> {
    let mut body = hex!("02 476173FF 1230 000001 01 01 80 01").to_vec();
    body.extend_from_slice(&[0xFF; 128]);
    signed_block(&body, 176, &[&[], &[0x01]])
}

/// ICC key of 64 bytes certified by the issuer key over `static_data`
pub fn icc_certificate(static_data: &[u8]) -> Vec<u8> {
    let mut body = hex!("04 4761739001010010FFFF 1230 000001 01 01 40 01").to_vec();
    body.extend_from_slice(&[0xFF; 64]);
    signed_block(&body, 128, &[&[], &[0x01], static_data])
}

/// CA key index, issuer certificate and issuer exponent
pub fn issuer_data() -> Vec<u8> {
    [
        tlv(&[0x8F], &[CA_KEY_INDEX]),
        tlv(&[0x90], &issuer_certificate()),
        tlv(&[0x9F, 0x32], &[0x01]),
    ]
    .concat()
}

/// ICC certificate and ICC exponent
pub fn icc_data(static_data: &[u8]) -> Vec<u8> {
    [
        tlv(&[0x9F, 0x46], &icc_certificate(static_data)),
        tlv(&[0x9F, 0x47], &[0x01]),
    ]
    .concat()
}

/// Signed Dynamic Application Data over `dynamic_data` and `terminal_data`
pub fn signed_dynamic_data(dynamic_data: &[u8], terminal_data: &[u8]) -> Vec<u8> {
    let mut body = vec![0x05, 0x01, dynamic_data.len() as u8];
    body.extend_from_slice(dynamic_data);
    signed_block(&body, 64, &[terminal_data])
}
