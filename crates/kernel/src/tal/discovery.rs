//! Candidate discovery (EMV Book 1 section 12.3)
//!
//! The payment system environment directory is tried first; the list of AIDs
//! method probes every supported AID with SELECT.

use nexum_emv_tlv::{TlvFlags, TlvList, ber, tags};
use nexum_emv_ttl::CardTransport;
use nexum_emv_ttl::commands::{self, SelectOccurrence};
use nexum_emv_ttl::status::common;
use tracing::{debug, instrument, trace};

use super::{Tal, TalError, TalOutcome, TalResult, parse_fci};

/// DF name of the payment system environment
pub const PSE_NAME: &[u8] = b"1PAY.SYS.DDF01";

/// Upper bound on SELECT next occurrence rounds for one terminal AID
const MAX_OCCURRENCES: usize = 32;

impl<T: CardTransport> Tal<T> {
    /// Read the PSE directory and return the application templates (`61`)
    /// whose ADF name matches a supported AID
    #[instrument(skip_all)]
    pub fn read_pse(&mut self, supported_aids: &TlvList) -> TalOutcome<Vec<TlvList>> {
        let command = commands::select(PSE_NAME, SelectOccurrence::First)?;
        let response = self.exchange("SELECT", &command)?;
        match response.status() {
            common::SUCCESS => {}
            common::FUNCTION_NOT_SUPPORTED => return Err(TalError::CardBlocked.into()),
            common::FILE_NOT_FOUND => return Err(TalResult::PseNotFound.into()),
            _ => return Err(TalResult::PseSelectFailed.into()),
        }

        let fci = parse_fci(response.payload()).ok_or(TalResult::PseSelectFailed)?;
        let sfi = match fci.value(tags::SFI) {
            Some(&[sfi]) if (1..=10).contains(&sfi) => sfi,
            _ => return Err(TalResult::PseSfiNotFound.into()),
        };

        let mut apps = Vec::new();
        for record in 1..=u8::MAX {
            let response = self.exchange("READ RECORD", &commands::read_record(sfi, record)?)?;
            match response.status() {
                common::SUCCESS => {}
                common::RECORD_NOT_FOUND => break,
                _ => return Err(TalResult::PseAefInvalid.into()),
            }
            let entries =
                parse_directory_record(response.payload()).ok_or(TalResult::PseAefInvalid)?;
            for entry in entries {
                match entry.value(tags::AID) {
                    Some(aid) if is_supported(aid, supported_aids) => {
                        debug!(aid = %hex::encode_upper(aid), "Supported application in PSE");
                        apps.push(entry);
                    }
                    aid => trace!(aid = ?aid.map(hex::encode_upper), "Skipping directory entry"),
                }
            }
        }
        Ok(apps)
    }

    /// Probe every supported AID with SELECT and return the FCI of each
    /// matching, unblocked application
    ///
    /// Partially matching terminal AIDs are followed with SELECT next
    /// occurrence until the card reports the file is not found.
    #[instrument(skip_all)]
    pub fn find_supported_apps(&mut self, supported_aids: &TlvList) -> TalOutcome<Vec<TlvList>> {
        let mut apps = Vec::new();

        for terminal_aid in supported_aids.iter() {
            let aid = terminal_aid.value();
            let partial = terminal_aid.flags().contains(TlvFlags::ASI_PARTIAL_MATCH);
            let mut occurrence = SelectOccurrence::First;

            for _ in 0..MAX_OCCURRENCES {
                let command = commands::select(aid, occurrence)?;
                let response = self.exchange("SELECT", &command)?;
                let status = response.status();
                match status {
                    common::SUCCESS | common::SELECTED_FILE_INVALIDATED => {}
                    common::FUNCTION_NOT_SUPPORTED => return Err(TalError::CardBlocked.into()),
                    _ => break,
                }

                match parse_fci(response.payload()) {
                    Some(fci) => {
                        let df_name = fci.value(tags::DF_NAME).unwrap_or_default();
                        let matches = df_name == aid || (partial && df_name.starts_with(aid));
                        if matches && status == common::SUCCESS {
                            debug!(df_name = %hex::encode_upper(df_name), "Supported application found");
                            apps.push(fci);
                        } else {
                            debug!(
                                df_name = %hex::encode_upper(df_name),
                                %status,
                                "Application not added"
                            );
                        }
                    }
                    None => debug!("Ignoring application with malformed FCI"),
                }

                if !partial {
                    break;
                }
                occurrence = SelectOccurrence::Next;
            }
        }
        Ok(apps)
    }
}

/// Application templates (`61`) of a directory record (`70`)
fn parse_directory_record(payload: &[u8]) -> Option<Vec<TlvList>> {
    let record = ber::decode_exact(payload).ok()?;
    if record.tag != tags::READ_RECORD_TEMPLATE {
        return None;
    }
    let mut entries = Vec::new();
    for object in ber::decode(record.value) {
        let object = object.ok()?;
        if object.tag == tags::APPLICATION_TEMPLATE {
            entries.push(TlvList::from_ber(object.value).ok()?);
        }
    }
    Some(entries)
}

/// Whether the card AID matches a terminal AID, exactly or by the
/// partial match selection indicator
fn is_supported(card_aid: &[u8], supported_aids: &TlvList) -> bool {
    supported_aids.iter().any(|terminal| {
        let aid = terminal.value();
        card_aid == aid
            || (terminal.flags().contains(TlvFlags::ASI_PARTIAL_MATCH)
                && card_aid.len() > aid.len()
                && card_aid.starts_with(aid))
    })
}
