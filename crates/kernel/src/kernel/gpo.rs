//! Initiate application processing (EMV Book 3 section 10.1)

use nexum_emv_tlv::{TlvFlags, TlvList, ber, dol, tags};
use nexum_emv_ttl::{BytesMut, CardTransport};
use tracing::{debug, info, instrument, warn};

use super::{Discovery, Initiated, Kernel, Retry, Selected, tal_failure};
use crate::error::{Error, Outcome, Termination};
use crate::fields::{tsi, tvr, zeroed_register};
use crate::tal::{TalFailure, TalResult};

/// POS Entry Mode for an integrated circuit card read
const POS_ENTRY_MODE_ICC: u8 = 0x05;

impl<'c, T: CardTransport> Kernel<'c, T, Selected> {
    /// GET PROCESSING OPTIONS
    ///
    /// The terminal list is set up with POS Entry Mode, the AID, zeroed TSI
    /// and TVR and a fresh Unpredictable Number. The PDOL is resolved
    /// against the transaction parameters, the configuration and the
    /// terminal list, in that order. On success `icc` holds the FCI followed
    /// by the AIP and AFL.
    ///
    /// A card answering conditions of use not satisfied fails with the
    /// retryable [`Outcome::GpoNotAccepted`].
    #[instrument(skip_all, fields(aid = %hex::encode_upper(self.state.application.aid())))]
    pub fn initiate(self) -> Result<Kernel<'c, T, Initiated>, Retry<'c, T>> {
        let Kernel { ctx, state } = self;
        let Selected {
            candidates,
            application,
            mut fci,
        } = state;

        ctx.icc.clear();
        ctx.terminal.clear();
        ctx.oda.clear();

        let result = setup_terminal(&mut ctx.terminal, application.aid())
            .map_err(Termination::from)
            .and_then(|()| {
                let un: [u8; 4] = ctx.random_bytes();
                ctx.terminal
                    .push(tags::UNPREDICTABLE_NUMBER, un, TlvFlags::NONE)?;
                ctx.icc.append(&mut fci);
                let pdol = ctx.icc.value(tags::PDOL).unwrap_or_default();
                let pdol_data = dol::build(pdol, &[&ctx.params, &ctx.config, &ctx.terminal])?;
                ctx.oda.set_pdol_data(&pdol_data).map_err(|_| Error::Parse("PDOL data"))?;
                let mut template = BytesMut::new();
                ber::encode(tags::COMMAND_TEMPLATE, &pdol_data, &mut template);
                debug!(pdol_data = %hex::encode_upper(&pdol_data), "PDOL related data");

                let mut response = TlvList::new();
                match ctx.tal.get_processing_options(&template, &mut response) {
                    Ok(()) => {}
                    Err(TalFailure::Result(TalResult::GpoConditionsNotSatisfied)) => {
                        info!("GPO conditions of use not satisfied");
                        return Err(Outcome::GpoNotAccepted.into());
                    }
                    Err(failure) => return Err(tal_failure(failure, Outcome::CardError)),
                }
                check_gpo_response(&ctx.icc, &response)?;
                ctx.icc.append(&mut response);
                Ok(())
            });

        match result {
            Ok(()) => {
                info!("Application processing initiated");
                Ok(Kernel::new(ctx, Initiated { application }))
            }
            Err(reason) => {
                warn!(%reason, "Initiate application processing failed");
                ctx.icc.clear();
                ctx.terminal.clear();
                ctx.oda.clear();
                Err(Retry::new(Kernel::new(ctx, Discovery { candidates }), reason))
            }
        }
    }
}

/// POS Entry Mode, terminal AID, TSI and TVR, in that order
fn setup_terminal(terminal: &mut TlvList, aid: &[u8]) -> Result<(), Error> {
    terminal.push(tags::POS_ENTRY_MODE, [POS_ENTRY_MODE_ICC], TlvFlags::NONE)?;
    terminal.push(tags::AID_TERMINAL, aid, TlvFlags::NONE)?;
    terminal.push_entry(zeroed_register(tags::TSI, tsi::LEN)?);
    terminal.push_entry(zeroed_register(tags::TVR, tvr::LEN)?);
    Ok(())
}

/// The GPO response must carry exactly one AIP and one AFL and nothing
/// already known from the FCI
fn check_gpo_response(icc: &TlvList, response: &TlvList) -> Result<(), Termination> {
    if let Some(tag) = response.find_duplicate() {
        warn!(tag = format_args!("{tag:02X}"), "Redundant GPO response field");
        return Err(Error::Parse("redundant GPO response field").into());
    }
    if let Some(entry) = response.iter().find(|e| icc.contains(e.tag())) {
        warn!(tag = format_args!("{:02X}", entry.tag()), "GPO field repeats FCI data");
        return Err(Error::Parse("redundant GPO response field").into());
    }
    match response.value(tags::AIP) {
        Some(aip) if aip.len() == 2 => {}
        _ => {
            warn!("GPO response without valid AIP");
            return Err(Outcome::CardError.into());
        }
    }
    if !response.contains(tags::AFL) {
        warn!("GPO response without AFL");
        return Err(Outcome::CardError.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use nexum_emv_tlv::{TlvFlags, TlvList, tags};

    use crate::config::KernelConfig;
    use crate::context::EmvContext;
    use crate::error::{Error, Outcome, Termination};
    use crate::test_utils::ScriptedCard;

    const SELECT_PSE: &[u8] = &hex!("00A404000E315041592E5359532E444446303100");
    const SELECT_VISA: &[u8] = &hex!("00A4040007A0000000031010 00");
    const NOT_FOUND: &[u8] = &hex!("6A82");
    const FCI: &[u8] = &hex!("6F098407A0000000031010 9000");
    const FCI_WITH_PDOL: &[u8] = &hex!("6F0F8407A0000000031010 9F3803 9F0206 9000");

    fn context(gpo: &[(&[u8], &[u8])]) -> EmvContext<ScriptedCard> {
        crate::test_utils::init_tracing();
        let mut script: Vec<(&[u8], &[u8])> = vec![
            (SELECT_PSE, NOT_FOUND),
            (SELECT_VISA, FCI),
            (SELECT_VISA, FCI_WITH_PDOL),
        ];
        script.extend_from_slice(gpo);
        let settings = KernelConfig::new().with_supported_aid(hex!("A0000000031010"), false);
        EmvContext::new(ScriptedCard::new(&script), settings)
            .unwrap()
            .with_seed(1)
    }

    fn params() -> TlvList {
        let mut params = TlvList::new();
        params
            .push(tags::AMOUNT_AUTHORISED_NUMERIC, hex!("000000001234"), TlvFlags::NONE)
            .unwrap();
        params
    }

    #[test]
    fn test_initiate_builds_terminal_and_icc_lists() {
        let mut ctx = context(&[(
            &hex!("80A8000008 8306 000000001234 00"),
            &hex!("800A 7800 08020200 10010100 9000"),
        )]);
        let mut kernel = ctx.begin(params());
        kernel.build_candidate_list().unwrap();
        let kernel = kernel.select_application(0).unwrap().initiate().unwrap();

        let ctx = kernel.context();
        let terminal_tags: Vec<u32> = ctx.terminal().iter().map(|e| e.tag()).collect();
        assert_eq!(
            terminal_tags,
            [
                tags::POS_ENTRY_MODE,
                tags::AID_TERMINAL,
                tags::TSI,
                tags::TVR,
                tags::UNPREDICTABLE_NUMBER
            ]
        );
        assert_eq!(ctx.terminal().value(tags::TVR), Some(&[0u8; 5][..]));
        assert_eq!(ctx.icc().value(tags::AIP), Some(&hex!("7800")[..]));
        assert_eq!(ctx.icc().value(tags::AFL), Some(&hex!("08020200 10010100")[..]));
        assert_eq!(ctx.icc().value(tags::PDOL), Some(&hex!("9F0206")[..]));
        assert_eq!(ctx.oda().pdol_data(), hex!("000000001234"));
    }

    #[test]
    fn test_gpo_not_accepted_is_retryable_only_with_candidates() {
        let mut ctx = context(&[(&hex!("80A8000008 8306 000000001234 00"), &hex!("6985"))]);
        let mut kernel = ctx.begin(params());
        kernel.build_candidate_list().unwrap();
        let retry = kernel.select_application(0).unwrap().initiate().unwrap_err();
        assert_eq!(retry.reason().outcome(), Some(Outcome::NotAccepted));
        let kernel = retry.into_kernel();
        assert!(kernel.context().icc().is_empty());
        assert!(kernel.context().terminal().is_empty());
    }

    #[test]
    fn test_gpo_response_checks() {
        // No AFL
        let mut ctx = context(&[(
            &hex!("80A8000008 8306 000000001234 00"),
            &hex!("7704 82027800 9000"),
        )]);
        let mut kernel = ctx.begin(params());
        kernel.build_candidate_list().unwrap();
        let retry = kernel.select_application(0).unwrap().initiate().unwrap_err();
        assert!(!retry.is_retryable());
        assert_eq!(retry.reason().outcome(), Some(Outcome::CardError));

        // AIP twice
        let mut ctx = context(&[(
            &hex!("80A8000008 8306 000000001234 00"),
            &hex!("770E 82027800 82027800 940408010100 9000"),
        )]);
        let mut kernel = ctx.begin(params());
        kernel.build_candidate_list().unwrap();
        let retry = kernel.select_application(0).unwrap().initiate().unwrap_err();
        assert!(matches!(
            retry.into_reason(),
            Termination::Error(Error::Parse(_))
        ));
    }
}
