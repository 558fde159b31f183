//! Terminal application layer
//!
//! Typed EMV card commands on top of the [`Ttl`]. Every command decodes its
//! response into a caller supplied [`TlvList`], appending and never replacing.
//! Failures are split into [`TalError`], which ends the card session, and
//! [`TalResult`], which leaves the choice of how to continue to the caller.

use nexum_emv_tlv::{TlvFlags, TlvList, ber, tags};
use nexum_emv_ttl::commands::{self, CryptogramType, SelectOccurrence};
use nexum_emv_ttl::status::common;
use nexum_emv_ttl::{CardTransport, Command, Response, Ttl};
use tracing::{debug, instrument, warn};

use crate::fields::AflEntry;
use crate::oda::OdaContext;

mod discovery;
mod error;

pub use error::{TalError, TalFailure, TalResult};

/// Result type of card commands
pub type TalOutcome<T = ()> = Result<T, TalFailure>;

/// Length of the Application Interchange Profile
const AIP_LEN: usize = 2;

/// Card command layer bound to a transport
#[derive(Debug)]
pub struct Tal<T> {
    ttl: Ttl<T>,
}

impl<T: CardTransport> Tal<T> {
    /// Create a command layer over `ttl`
    pub const fn new(ttl: Ttl<T>) -> Self {
        Self { ttl }
    }

    /// Transport layer
    pub const fn ttl(&self) -> &Ttl<T> {
        &self.ttl
    }

    /// Mutable transport layer
    pub const fn ttl_mut(&mut self) -> &mut Ttl<T> {
        &mut self.ttl
    }

    /// Consume the command layer and return the transport layer
    pub fn into_inner(self) -> Ttl<T> {
        self.ttl
    }

    fn exchange(&mut self, name: &'static str, command: &Command) -> Result<Response, TalError> {
        let response = self.ttl.transceive(command)?;
        debug!(
            command = name,
            status = %response.status(),
            len = response.payload().len(),
            "Card command complete"
        );
        Ok(response)
    }

    /// SELECT the application `aid` and decode its FCI into `list`
    ///
    /// The DF name in the FCI must be `aid`.
    #[instrument(skip(self, aid, list), fields(aid = %hex::encode_upper(aid)))]
    pub fn select_application(&mut self, aid: &[u8], list: &mut TlvList) -> TalOutcome {
        let command = commands::select(aid, SelectOccurrence::First)?;
        let response = self.exchange("SELECT", &command)?;
        match response.status() {
            common::SUCCESS => {}
            common::FUNCTION_NOT_SUPPORTED => return Err(TalError::CardBlocked.into()),
            common::SELECTED_FILE_INVALIDATED => return Err(TalResult::AppBlocked.into()),
            common::FILE_NOT_FOUND => return Err(TalResult::AppNotFound.into()),
            _ => return Err(TalResult::AppSelectionFailed.into()),
        }

        let mut fci = parse_fci(response.payload()).ok_or(TalResult::AppFciParseFailed)?;
        if fci.value(tags::DF_NAME) != Some(aid) {
            warn!("FCI DF name does not match the selected AID");
            return Err(TalResult::AppFciParseFailed.into());
        }
        list.append(&mut fci);
        Ok(())
    }

    /// GET PROCESSING OPTIONS with the encoded Command Template `data`
    ///
    /// Format 1 responses are split into AIP (`82`) and AFL (`94`).
    #[instrument(skip_all)]
    pub fn get_processing_options(&mut self, data: &[u8], list: &mut TlvList) -> TalOutcome {
        let command = commands::get_processing_options(data)?;
        let response = self.exchange("GET PROCESSING OPTIONS", &command)?;
        match response.status() {
            common::SUCCESS => {}
            common::CONDITIONS_OF_USE_NOT_SATISFIED => {
                return Err(TalResult::GpoConditionsNotSatisfied.into());
            }
            status => return Err(TalResult::GpoFailed(status).into()),
        }

        let tlv = ber::decode_exact(response.payload())?;
        match tlv.tag {
            tags::RESPONSE_FORMAT_1 => {
                if tlv.value.len() < AIP_LEN || (tlv.value.len() - AIP_LEN) % 4 != 0 {
                    return Err(TalError::Parse("GPO format 1 length").into());
                }
                let (aip, afl) = tlv.value.split_at(AIP_LEN);
                list.push(tags::AIP, aip, TlvFlags::NONE)?;
                list.push(tags::AFL, afl, TlvFlags::NONE)?;
            }
            tags::RESPONSE_FORMAT_2 => list.parse_ber(tlv.value)?,
            _ => return Err(TalError::Parse("GPO response template").into()),
        }
        Ok(())
    }

    /// READ RECORD every record named by `afl`
    ///
    /// Record contents are appended to `list`. Records flagged for offline
    /// data authentication are appended to the ODA record buffer: the value
    /// of the `70` template for SFI 1 to 10, the whole record for SFI 11 to
    /// 30. A flagged record that is not a `70` template is reported as
    /// [`TalResult::OdaRecordInvalid`] once every record has been read.
    #[instrument(skip_all, fields(entries = afl.len()))]
    pub fn read_afl_records(
        &mut self,
        afl: &[AflEntry],
        list: &mut TlvList,
        oda: &mut OdaContext,
    ) -> TalOutcome {
        let mut oda_record_invalid = false;

        for entry in afl {
            for record in entry.records() {
                let command = commands::read_record(entry.sfi, record)?;
                let response = self.exchange("READ RECORD", &command)?;
                if !response.is_success() {
                    warn!(sfi = entry.sfi, record, status = %response.status(), "READ RECORD failed");
                    return Err(TalResult::ReadRecordFailed.into());
                }

                let payload = response.payload();
                let tlv = ber::decode_exact(payload)?;
                let is_template = tlv.tag == tags::READ_RECORD_TEMPLATE;
                let for_oda = entry.is_oda_record(record);

                if entry.sfi <= 10 {
                    if !is_template {
                        return Err(TalError::Parse("record is not a 70 template").into());
                    }
                    if for_oda {
                        oda.append_record(tlv.value)?;
                    }
                } else if for_oda {
                    if is_template {
                        oda.append_record(payload)?;
                    } else {
                        oda_record_invalid = true;
                    }
                }

                if is_template {
                    list.parse_ber(tlv.value)?;
                }
            }
        }

        if oda_record_invalid {
            return Err(TalResult::OdaRecordInvalid.into());
        }
        Ok(())
    }

    /// GET DATA for a primitive data object such as ATC (`9F36`)
    #[instrument(skip(self, list))]
    pub fn get_data(&mut self, tag: u16, list: &mut TlvList) -> TalOutcome {
        let response = self.exchange("GET DATA", &commands::get_data(tag))?;
        if !response.is_success() {
            return Err(TalResult::GetDataFailed.into());
        }
        let tlv = ber::decode_exact(response.payload())?;
        if tlv.tag != u32::from(tag) {
            return Err(TalResult::GetDataFailed.into());
        }
        list.push(tlv.tag, tlv.value, TlvFlags::NONE)?;
        Ok(())
    }

    /// INTERNAL AUTHENTICATE with DDOL related `data`
    ///
    /// A format 1 response is stored as Signed Dynamic Application Data (`9F4B`).
    #[instrument(skip_all)]
    pub fn internal_authenticate(&mut self, data: &[u8], list: &mut TlvList) -> TalOutcome {
        let command = commands::internal_authenticate(data)?;
        let response = self.exchange("INTERNAL AUTHENTICATE", &command)?;
        if !response.is_success() {
            return Err(TalResult::InternalAuthenticateFailed.into());
        }
        let tlv = ber::decode_exact(response.payload())?;
        match tlv.tag {
            tags::RESPONSE_FORMAT_1 => {
                list.push(tags::SIGNED_DYNAMIC_APPLICATION_DATA, tlv.value, TlvFlags::NONE)?;
            }
            tags::RESPONSE_FORMAT_2 => list.parse_ber(tlv.value)?,
            _ => return Err(TalError::Parse("INTERNAL AUTHENTICATE response template").into()),
        }
        Ok(())
    }

    /// GENERATE AC requesting `cryptogram` with CDOL related `data`
    ///
    /// The response data objects other than the Signed Dynamic Application
    /// Data are kept in `oda` for the CDA transaction data hash.
    #[instrument(skip(self, data, list, oda))]
    pub fn generate_ac(
        &mut self,
        cryptogram: CryptogramType,
        cda: bool,
        data: &[u8],
        list: &mut TlvList,
        oda: &mut OdaContext,
    ) -> TalOutcome {
        let command = commands::generate_ac(cryptogram, cda, data)?;
        let response = self.exchange("GENERATE AC", &command)?;
        if !response.is_success() {
            return Err(TalResult::GenacFailed.into());
        }

        let tlv = ber::decode_exact(response.payload())?;
        match tlv.tag {
            tags::RESPONSE_FORMAT_1 => {
                // CID (1), ATC (2), Application Cryptogram (8), optional IAD
                if tlv.value.len() < 11 {
                    return Err(TalError::Parse("GENERATE AC format 1 length").into());
                }
                let (cid, rest) = tlv.value.split_at(1);
                let (atc, rest) = rest.split_at(2);
                let (ac, iad) = rest.split_at(8);
                list.push(tags::CRYPTOGRAM_INFORMATION_DATA, cid, TlvFlags::NONE)?;
                list.push(tags::ATC, atc, TlvFlags::NONE)?;
                list.push(tags::APPLICATION_CRYPTOGRAM, ac, TlvFlags::NONE)?;
                if !iad.is_empty() {
                    list.push(tags::ISSUER_APPLICATION_DATA, iad, TlvFlags::NONE)?;
                }
                oda.set_genac_data(&[])?;
            }
            tags::RESPONSE_FORMAT_2 => {
                let mut hashed = Vec::with_capacity(tlv.value.len());
                for object in ber::decode(tlv.value) {
                    let object = object?;
                    if object.tag != tags::SIGNED_DYNAMIC_APPLICATION_DATA {
                        hashed.extend_from_slice(object.raw);
                    }
                }
                oda.set_genac_data(&hashed)?;
                list.parse_ber(tlv.value)?;
            }
            _ => return Err(TalError::Parse("GENERATE AC response template").into()),
        }
        Ok(())
    }
}

/// Decode an FCI template (`6F`) with a DF name (`84`)
fn parse_fci(payload: &[u8]) -> Option<TlvList> {
    let tlv = ber::decode_exact(payload).ok()?;
    if tlv.tag != tags::FCI_TEMPLATE {
        return None;
    }
    let list = TlvList::from_ber(tlv.value).ok()?;
    list.contains(tags::DF_NAME).then_some(list)
}
