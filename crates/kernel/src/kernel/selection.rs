//! Candidate discovery and application selection (EMV Book 1 section 12)

use nexum_emv_tlv::{TlvList, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{debug, info, instrument, warn};

use super::{Discovery, Kernel, Retry, Selected, tal_failure, terminal_data};
use crate::app::{Candidate, CandidateList};
use crate::error::{Outcome, Termination};
use crate::tal::{TalError, TalFailure};

impl<'c, T: CardTransport> Kernel<'c, T, Discovery> {
    /// Candidate applications, highest priority first
    pub fn candidates(&self) -> &CandidateList {
        &self.state.candidates
    }

    /// Build the candidate list
    ///
    /// The PSE directory is read first. When the card has no usable PSE, or
    /// the PSE lists no supported application, every supported AID is
    /// probed with SELECT. An empty result is [`Outcome::NotAccepted`].
    #[instrument(skip_all)]
    pub fn build_candidate_list(&mut self) -> Result<(), Termination> {
        let ctx = &mut *self.ctx;
        let entries = match ctx.tal.read_pse(&ctx.supported_aids) {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => {
                debug!("PSE lists no supported application");
                Vec::new()
            }
            Err(TalFailure::Error(TalError::CardBlocked)) => {
                warn!("Card blocked while selecting the PSE");
                return Err(Outcome::CardBlocked.into());
            }
            Err(TalFailure::Error(error)) => return Err(error.into()),
            Err(TalFailure::Result(result)) => {
                debug!(%result, "PSE unavailable");
                Vec::new()
            }
        };

        let entries = if entries.is_empty() {
            info!("Building candidate list from supported AIDs");
            ctx.tal
                .find_supported_apps(&ctx.supported_aids)
                .map_err(|failure| tal_failure(failure, Outcome::NotAccepted))?
        } else {
            entries
        };

        let additional: [u8; 5] =
            terminal_data(&ctx.config, tags::ADDITIONAL_TERMINAL_CAPABILITIES)?;
        let candidates = &mut self.state.candidates;
        candidates.clear();
        for entry in entries {
            candidates.insert(Candidate::from_tlv(entry, &additional)?);
        }

        if candidates.is_empty() {
            info!("No mutually supported application");
            return Err(Outcome::NotAccepted.into());
        }
        info!(count = candidates.len(), "Candidate list built");
        Ok(())
    }

    /// SELECT the candidate at `index`
    ///
    /// The candidate is removed from the list whatever the result, so a card
    /// application is offered at most once. An `index` out of range removes
    /// nothing and fails with [`Error::InvalidParameter`](crate::Error::InvalidParameter).
    #[instrument(skip(self))]
    pub fn select_application(mut self, index: usize) -> Result<Kernel<'c, T, Selected>, Retry<'c, T>> {
        let application = match self.state.candidates.remove(index) {
            Ok(application) => application,
            Err(error) => return Err(Retry::new(self, error.into())),
        };
        info!(
            aid = %hex::encode_upper(application.aid()),
            name = application.display_name(),
            "Selecting application"
        );

        let mut fci = TlvList::new();
        if let Err(failure) = self.ctx.tal.select_application(application.aid(), &mut fci) {
            let reason = tal_failure(failure, Outcome::TryAgain);
            warn!(%reason, "Application selection failed");
            return Err(Retry::new(self, reason));
        }

        let candidates = std::mem::take(&mut self.state.candidates);
        Ok(self.advance(Selected {
            candidates,
            application,
            fci,
        }))
    }
}
