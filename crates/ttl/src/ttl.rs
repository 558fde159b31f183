//! Terminal transport layer state machine
//!
//! Turns one logical C-APDU into the sequence of exchanges the reader needs.
//! In APDU mode the reader frames complete commands; in TPDU mode the header
//! is sent first and the card drives the rest with T=0 procedure bytes.
//!
//! Status words are handled the same way in both modes:
//!
//! | Status | Action |
//! |---|---|
//! | `61xx` | GET RESPONSE with `Le = xx`, response data accumulates |
//! | `6Cxx` | resend the last command with `Le = xx` |
//! | `62xx`/`63xx` without data on a case 4 command | GET RESPONSE with `Le = 00`, the warning is kept as final status |
//! | anything else | final status, returned to the caller |

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{Level, debug, event, instrument, trace};

use crate::command::{ApduCase, Command, HEADER_LEN, MAX_RESPONSE_DATA_LEN};
use crate::error::TtlError;
use crate::response::Response;
use crate::status::StatusWord;
use crate::transport::{CardTransport, TransportMode};

/// NULL procedure byte, the card asks for more time
const PROCEDURE_NULL: u8 = 0x60;

/// Instruction byte of GET RESPONSE
const INS_GET_RESPONSE: u8 = 0xC0;

/// Default limit on GET RESPONSE and Le correction rounds per command
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Terminal transport layer bound to a card transport
#[derive(Debug)]
pub struct Ttl<T> {
    transport: T,
    mode: TransportMode,
    max_rounds: usize,
}

/// One short command exchange; the original command, a GET RESPONSE or a
/// resend with corrected Le
#[derive(Debug, Clone, Copy)]
struct Exchange<'a> {
    header: [u8; HEADER_LEN],
    data: &'a [u8],
    le: Option<u8>,
}

impl<'a> Exchange<'a> {
    fn from_c_apdu(c_apdu: &'a [u8], case: ApduCase) -> Self {
        let header = [c_apdu[0], c_apdu[1], c_apdu[2], c_apdu[3]];
        let (data, le) = match case {
            ApduCase::Case2S => (&[][..], Some(c_apdu[4])),
            ApduCase::Case3S => (&c_apdu[5..], None),
            ApduCase::Case4S => (&c_apdu[5..c_apdu.len() - 1], Some(c_apdu[c_apdu.len() - 1])),
            _ => (&[][..], None),
        };
        Self { header, data, le }
    }

    const fn get_response(le: u8) -> Self {
        Self {
            header: [0x00, INS_GET_RESPONSE, 0x00, 0x00],
            data: &[],
            le: Some(le),
        }
    }

    const fn ins(&self) -> u8 {
        self.header[1]
    }

    const fn expects_data(&self) -> bool {
        self.le.is_some()
    }

    const fn is_case_1(&self) -> bool {
        self.data.is_empty() && self.le.is_none()
    }

    /// Complete C-APDU as sent in APDU mode
    fn to_c_apdu(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 2 + self.data.len());
        buf.put_slice(&self.header);
        if !self.data.is_empty() {
            buf.put_u8(self.data.len() as u8);
            buf.put_slice(self.data);
        }
        if let Some(le) = self.le {
            buf.put_u8(le);
        }
        buf.freeze()
    }

    /// C-TPDU header; P3 is Lc when data is sent, otherwise Le, and `00` for case 1
    fn to_c_tpdu_header(&self) -> [u8; HEADER_LEN + 1] {
        let p3 = if self.data.is_empty() {
            self.le.unwrap_or(0x00)
        } else {
            self.data.len() as u8
        };
        let [cla, ins, p1, p2] = self.header;
        [cla, ins, p1, p2, p3]
    }
}

/// Caller supplied output buffer that response data accumulates into
struct ResponseBuffer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl ResponseBuffer<'_> {
    fn extend(&mut self, data: &[u8]) -> Result<(), TtlError> {
        let end = self.len + data.len();
        let available = self.buf.len();
        let dest = self
            .buf
            .get_mut(self.len..end)
            .ok_or(TtlError::BufferTooSmall {
                needed: end,
                available,
            })?;
        dest.copy_from_slice(data);
        self.len = end;
        Ok(())
    }
}

impl<T: CardTransport> Ttl<T> {
    /// Create a transport layer over `transport` using the given framing
    pub const fn new(transport: T, mode: TransportMode) -> Self {
        Self {
            transport,
            mode,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Limit the number of GET RESPONSE and Le correction rounds per command
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Framing used with the reader
    pub const fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the transport layer and return the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Exchange a C-APDU with the card
    ///
    /// Response data is written to `r_apdu`; the number of data bytes and the
    /// final status word are returned.
    #[instrument(level = "trace", skip_all, fields(mode = %self.mode))]
    pub fn trx(
        &mut self,
        c_apdu: &[u8],
        r_apdu: &mut [u8],
    ) -> Result<(usize, StatusWord), TtlError> {
        let case = ApduCase::classify(c_apdu)?;
        if !case.is_short() {
            return Err(TtlError::UnsupportedCase(case));
        }
        trace!(%case, c_apdu = %hex::encode_upper(c_apdu), "Sending command");

        let mut output = ResponseBuffer {
            buf: r_apdu,
            len: 0,
        };
        let mut current = Exchange::from_c_apdu(c_apdu, case);
        let mut warning: Option<StatusWord> = None;

        for _ in 0..self.max_rounds {
            let (data, status) = match self.mode {
                TransportMode::Apdu => self.exchange_apdu(&current)?,
                TransportMode::Tpdu => self.exchange_tpdu(&current)?,
            };
            output.extend(&data)?;

            if let Some(available) = status.bytes_available() {
                debug!(available, "Card has more response bytes");
                current = Exchange::get_response(available);
                continue;
            }

            // In TPDU mode P3 only carries Le when no data is sent
            let le_correctable = current.expects_data()
                && (self.mode == TransportMode::Apdu || current.data.is_empty());
            if let Some(le) = status.corrected_le().filter(|_| le_correctable) {
                debug!(le, "Resending with corrected Le");
                current.le = Some(le);
                continue;
            }

            if case == ApduCase::Case4S
                && warning.is_none()
                && status.is_warning()
                && output.len == 0
            {
                debug!(%status, "Warning without data on case 4 command");
                warning = Some(status);
                current = Exchange::get_response(0x00);
                continue;
            }

            let status = warning.unwrap_or(status);
            log_status(status);
            return Ok((output.len, status));
        }

        Err(TtlError::ChainLimitExceeded(self.max_rounds))
    }

    /// Exchange a command and collect the complete response
    pub fn transceive(&mut self, command: &Command) -> Result<Response, TtlError> {
        let c_apdu = command.to_bytes()?;
        let mut r_apdu = [0u8; MAX_RESPONSE_DATA_LEN];
        let (len, status) = self.trx(&c_apdu, &mut r_apdu)?;
        Ok(Response::new(Bytes::copy_from_slice(&r_apdu[..len]), status))
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<Bytes, TtlError> {
        self.transport
            .transmit_raw(bytes)
            .map_err(|e| TtlError::Transport(e.into()))
    }

    /// APDU mode: one complete C-APDU, one complete R-APDU
    fn exchange_apdu(&mut self, exchange: &Exchange<'_>) -> Result<(Bytes, StatusWord), TtlError> {
        let rx = self.transmit(&exchange.to_c_apdu())?;
        if rx.len() < 2 || (exchange.is_case_1() && rx.len() != 2) {
            return Err(TtlError::InvalidResponseLength(rx.len()));
        }
        Ok(split_status(rx))
    }

    /// TPDU mode: header, procedure bytes, data and final status
    fn exchange_tpdu(&mut self, exchange: &Exchange<'_>) -> Result<(Bytes, StatusWord), TtlError> {
        let ins = exchange.ins();
        let mut remaining = exchange.data;
        let mut rx = self.transmit(&exchange.to_c_tpdu_header())?;

        loop {
            let nulls = rx.iter().take_while(|b| **b == PROCEDURE_NULL).count();
            let body = rx.slice(nulls..);
            let Some(&procedure) = body.first() else {
                trace!("NULL procedure byte, waiting");
                rx = self.transmit(&[])?;
                continue;
            };

            if procedure == ins {
                if !remaining.is_empty() {
                    trace!(len = remaining.len(), "ACK, sending remaining data");
                    rx = self.transmit(remaining)?;
                    remaining = &[];
                    continue;
                }
                if !exchange.expects_data() {
                    return Err(TtlError::UnexpectedProcedureByte(procedure));
                }
                // Echoed INS, response data, SW1 SW2
                let response = body.slice(1..);
                if response.len() < 2 {
                    return Err(TtlError::InvalidResponseLength(body.len()));
                }
                return Ok(split_status(response));
            }

            if procedure == !ins {
                let Some((next, rest)) = remaining.split_first() else {
                    return Err(TtlError::UnexpectedProcedureByte(procedure));
                };
                trace!("ACK, sending one byte");
                rx = self.transmit(&[*next])?;
                remaining = rest;
                continue;
            }

            if StatusWord::is_valid_sw1(procedure) {
                if body.len() != 2 {
                    return Err(TtlError::InvalidResponseLength(body.len()));
                }
                return Ok(split_status(body));
            }

            return Err(TtlError::UnexpectedProcedureByte(procedure));
        }
    }
}

/// Split trailing SW1 SW2 off a response of at least two bytes
fn split_status(mut rx: Bytes) -> (Bytes, StatusWord) {
    let sw = rx.split_off(rx.len() - 2);
    (rx, StatusWord::new(sw[0], sw[1]))
}

fn log_status(status: StatusWord) {
    let level = status.tracing_level();
    if level == Level::DEBUG {
        event!(Level::DEBUG, %status, description = status.description(), "Command complete");
    } else if level == Level::INFO {
        event!(Level::INFO, %status, description = status.description(), "Command complete");
    } else {
        event!(Level::WARN, %status, description = status.description(), "Command complete");
    }
}
