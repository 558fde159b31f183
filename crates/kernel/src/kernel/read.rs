//! Read application data (EMV Book 3 section 10.2)

use nexum_emv_tlv::{TlvList, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{info, instrument, warn};

use super::{DataRead, Initiated, Kernel, tal_failure};
use crate::error::{Error, Outcome, Termination};
use crate::fields::AflEntry;
use crate::tal::{TalFailure, TalResult};

/// Data objects every application must provide in its records
const MANDATORY: [(u32, &str); 4] = [
    (tags::APPLICATION_EXPIRATION_DATE, "Application Expiration Date"),
    (tags::PAN, "PAN"),
    (tags::CDOL1, "CDOL1"),
    (tags::CDOL2, "CDOL2"),
];

impl<'c, T: CardTransport> Kernel<'c, T, Initiated> {
    /// READ RECORD every record named by the AFL
    ///
    /// A malformed AFL or a record field that is already known is a parse
    /// error. A record flagged for offline data authentication that cannot be
    /// used only marks the ODA record data invalid; authentication then fails
    /// later. Missing mandatory data is [`Outcome::CardError`].
    #[instrument(skip_all)]
    pub fn read_application_data(self) -> Result<Kernel<'c, T, DataRead>, Termination> {
        let ctx = &mut *self.ctx;
        let afl = ctx
            .icc
            .value(tags::AFL)
            .ok_or(Error::Internal("AFL not available"))?;
        let afl = AflEntry::parse_all(afl)?;

        let mut records = TlvList::new();
        match ctx.tal.read_afl_records(&afl, &mut records, &mut ctx.oda) {
            Ok(()) => {}
            Err(TalFailure::Result(TalResult::OdaRecordInvalid)) => {
                warn!("Record for offline data authentication is invalid");
                ctx.oda.invalidate_records();
            }
            Err(failure) => return Err(tal_failure(failure, Outcome::CardError)),
        }

        if let Some(tag) = records.find_duplicate() {
            warn!(tag = format_args!("{tag:02X}"), "Redundant record field");
            return Err(Error::Parse("redundant record field").into());
        }
        if let Some(entry) = records.iter().find(|e| ctx.icc.contains(e.tag())) {
            warn!(tag = format_args!("{:02X}", entry.tag()), "Record field already known");
            return Err(Error::Parse("redundant record field").into());
        }
        ctx.icc.append(&mut records);

        for (tag, name) in MANDATORY {
            if !ctx.icc.contains(tag) {
                warn!(field = name, "Mandatory data missing");
                return Err(Outcome::CardError.into());
            }
        }

        info!(
            fields = ctx.icc.len(),
            oda_data = ctx.oda.records().len(),
            "Application data read"
        );
        let application = self.state.application;
        Ok(Kernel::new(self.ctx, DataRead { application }))
    }
}
