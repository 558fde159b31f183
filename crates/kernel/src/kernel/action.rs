//! Terminal and card action analysis (EMV Book 3 sections 10.7 and 10.8)
//!
//! The terminal decides which cryptogram to request from the TVR and the
//! issuer and terminal action codes, then the first GENERATE AC is sent.
//! Only an offline decline is carried through to an outcome; approvals and
//! online authorisation are reported as unimplemented.

use nexum_emv_tlv::{TlvFlags, TlvList, dol, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{debug, info, instrument, warn};

use super::{
    ActionAnalyzed, CryptogramType, Kernel, RiskManaged, set_tsi, set_tvr, tal_failure,
    terminal_data,
};
use crate::context::EmvContext;
use crate::error::{Error, Outcome, Termination};
use crate::fields::{tsi, tvr};
use crate::oda::cert::{self, CdaDynamicData};
use crate::oda::{OdaError, OdaMethod};

impl<'c, T: CardTransport> Kernel<'c, T, RiskManaged> {
    /// Terminal action analysis and the first GENERATE AC
    ///
    /// The card may answer with a lower cryptogram than requested (ARQC
    /// instead of TC, AAC instead of either) but never a higher one. A CDA
    /// signature that does not verify sets the TVR bit and declines.
    #[instrument(skip_all)]
    pub fn analyze_card_action(self) -> Result<Kernel<'c, T, ActionAnalyzed>, Termination> {
        let ctx = &mut *self.ctx;
        if ctx.oda.method() == OdaMethod::Xda {
            return Err(Error::Unimplemented("XDA card action analysis").into());
        }

        let [terminal_type] = terminal_data(&ctx.config, tags::TERMINAL_TYPE)?;
        let requested = terminal_action(&ctx.icc, &ctx.config, &ctx.terminal, terminal_type)?;
        let cda = ctx.oda.method() == OdaMethod::Cda
            && ctx.oda.icc_key().is_some()
            && requested != CryptogramType::Aac;
        info!(%requested, cda, "Terminal action analysis");

        let cdol1 = ctx
            .icc
            .value(tags::CDOL1)
            .ok_or(Error::Internal("CDOL1 not available"))?;
        let cdol1_data = dol::build(cdol1, &[&ctx.params, &ctx.config, &ctx.terminal])?;
        ctx.oda
            .set_cdol1_data(&cdol1_data)
            .map_err(|_| Error::Parse("CDOL1 data"))?;
        set_tsi(&mut ctx.terminal, tsi::CARD_RISK_MANAGEMENT_PERFORMED)?;

        let mut response = TlvList::new();
        ctx.tal
            .generate_ac(requested, cda, &cdol1_data, &mut response, &mut ctx.oda)
            .map_err(|failure| tal_failure(failure, Outcome::CardError))?;
        if let Some(tag) = response.find_duplicate() {
            warn!(tag = format_args!("{tag:02X}"), "Redundant GENERATE AC field");
            return Err(Error::Parse("redundant GENERATE AC field").into());
        }
        if let Some(entry) = response.iter().find(|e| ctx.icc.contains(e.tag())) {
            warn!(tag = format_args!("{:02X}", entry.tag()), "GENERATE AC field already known");
            return Err(Error::Parse("redundant GENERATE AC field").into());
        }

        let cid = match response.value(tags::CRYPTOGRAM_INFORMATION_DATA) {
            Some([cid]) => *cid,
            _ => {
                warn!("GENERATE AC response without Cryptogram Information Data");
                return Err(Outcome::CardError.into());
            }
        };
        if !response.contains(tags::ATC) {
            warn!("GENERATE AC response without ATC");
            return Err(Outcome::CardError.into());
        }
        let Some(cryptogram) = CryptogramType::from_cid(cid) else {
            warn!(cid = format_args!("{cid:02X}"), "Reserved cryptogram type");
            return Err(Outcome::CardError.into());
        };
        if rank(cryptogram) > rank(requested) {
            warn!(%requested, %cryptogram, "Card returned a higher cryptogram than requested");
            return Err(Outcome::CardError.into());
        }
        info!(%cryptogram, "Card action analysis");

        let mut declined = cryptogram == CryptogramType::Aac;
        if cda && cryptogram != CryptogramType::Aac {
            match verify_combined(ctx, &response, cid) {
                Ok(signed) => {
                    debug!("CDA signature verified");
                    response.push(tags::ICC_DYNAMIC_NUMBER, signed.icc_dynamic_number, TlvFlags::NONE)?;
                    if !response.contains(tags::APPLICATION_CRYPTOGRAM) {
                        response.push(tags::APPLICATION_CRYPTOGRAM, signed.cryptogram, TlvFlags::NONE)?;
                    }
                }
                Err(error) => {
                    warn!(%error, "CDA failed");
                    set_tvr(&mut ctx.terminal, tvr::CDA_FAILED)?;
                    declined = true;
                }
            }
        }
        ctx.icc.append(&mut response);

        if !declined {
            return Err(match cryptogram {
                CryptogramType::Tc => Error::Unimplemented("offline approval"),
                _ => Error::Unimplemented("online authorisation"),
            }
            .into());
        }
        info!("Transaction declined offline");
        let application = self.state.application;
        Ok(Kernel::new(
            self.ctx,
            ActionAnalyzed {
                application,
                requested,
                cryptogram,
                outcome: Outcome::Declined,
            },
        ))
    }
}

/// AAC < ARQC < TC
const fn rank(cryptogram: CryptogramType) -> u8 {
    match cryptogram {
        CryptogramType::Aac => 0,
        CryptogramType::Arqc => 1,
        CryptogramType::Tc => 2,
    }
}

/// Cryptogram to request from the TVR and the action codes
///
/// An absent Issuer Action Code - Denial counts as all zeros, the other
/// absent issuer codes as all ones.
fn terminal_action(
    icc: &TlvList,
    config: &TlvList,
    terminal: &TlvList,
    terminal_type: u8,
) -> Result<CryptogramType, Error> {
    let tvr = terminal
        .value(tags::TVR)
        .ok_or(Error::Internal("TVR not initialised"))?;
    let matches = |iac_tag: u32, tac_tag: u32, absent: u8| {
        let iac = icc.value(iac_tag);
        let tac = config.value(tac_tag).unwrap_or_default();
        tvr.iter().enumerate().any(|(i, &bits)| {
            let iac = iac.map_or(absent, |v| v.get(i).copied().unwrap_or(0));
            let tac = tac.get(i).copied().unwrap_or(0);
            bits & (iac | tac) != 0
        })
    };

    use tags::proprietary::{TAC_DEFAULT, TAC_DENIAL, TAC_ONLINE};
    if matches(tags::IAC_DENIAL, TAC_DENIAL, 0x00) {
        return Ok(CryptogramType::Aac);
    }
    let online_capable = matches!(terminal_type & 0x0F, 0x01 | 0x02 | 0x04 | 0x05);
    let cryptogram = if online_capable {
        if matches(tags::IAC_ONLINE, TAC_ONLINE, 0xFF) {
            CryptogramType::Arqc
        } else {
            CryptogramType::Tc
        }
    } else if matches(tags::IAC_DEFAULT, TAC_DEFAULT, 0xFF) {
        CryptogramType::Aac
    } else {
        CryptogramType::Tc
    };
    Ok(cryptogram)
}

/// Verify the CDA signature in the GENERATE AC response
fn verify_combined<T>(
    ctx: &EmvContext<T>,
    response: &TlvList,
    cid: u8,
) -> Result<CdaDynamicData, OdaError> {
    let key = ctx
        .oda
        .icc_key()
        .ok_or(OdaError::MissingData("ICC public key"))?;
    let sdad = response
        .value(tags::SIGNED_DYNAMIC_APPLICATION_DATA)
        .ok_or(OdaError::MissingData("Signed Dynamic Application Data"))?;
    let un = ctx
        .terminal
        .value(tags::UNPREDICTABLE_NUMBER)
        .ok_or(OdaError::MissingData("Unpredictable Number"))?;
    let dynamic_data = cert::verify_dynamic_data(key, sdad, un)?;
    let signed = CdaDynamicData::parse(&dynamic_data)?;
    if signed.cid != cid {
        return Err(OdaError::InvalidFormat("signed cryptogram information data"));
    }
    if signed.transaction_data_hash != ctx.oda.transaction_data_hash() {
        return Err(OdaError::HashMismatch);
    }
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use nexum_emv_tlv::{TlvFlags, tags};

    use super::super::{CryptogramType, Kernel, RiskManaged};
    use crate::config::KernelConfig;
    use crate::context::EmvContext;
    use crate::error::{Error, Outcome, Termination};
    use crate::fields::tvr;
    use crate::kernel::set_tvr;
    use crate::oda::{OdaMethod, RsaKey, cert};
    use crate::test_utils::{self, ScriptedCard, candidate, signed_block, terminal_registers};

    /// Amount, Unpredictable Number and TVR
    const CDOL1: &[u8] = &hex!("9F0206 9F3704 9505");

    fn context(script: &[(&[u8], &[u8])], cdol1: &[u8]) -> EmvContext<ScriptedCard> {
        let mut ctx = test_utils::context(script, KernelConfig::new());
        ctx.params
            .push(tags::AMOUNT_AUTHORISED_NUMERIC, hex!("000000001000"), TlvFlags::NONE)
            .unwrap();
        ctx.icc.push(tags::CDOL1, cdol1, TlvFlags::NONE).unwrap();
        ctx.terminal = terminal_registers();
        ctx
    }

    fn analyze(ctx: &mut EmvContext<ScriptedCard>) -> Result<(CryptogramType, Outcome), Termination> {
        let state = RiskManaged {
            application: candidate(&hex!("A0000000031010")),
        };
        let kernel = Kernel::new(ctx, state).analyze_card_action()?;
        Ok((kernel.state().cryptogram(), kernel.state().outcome()))
    }

    /// Issuer denies when the floor limit is exceeded
    fn denied(script: &[(&[u8], &[u8])]) -> EmvContext<ScriptedCard> {
        let mut ctx = context(script, CDOL1);
        ctx.icc
            .push(tags::IAC_DENIAL, hex!("0000008000"), TlvFlags::NONE)
            .unwrap();
        set_tvr(&mut ctx.terminal, tvr::FLOOR_LIMIT_EXCEEDED).unwrap();
        ctx
    }

    const GENAC_AAC: &[u8] = &hex!("80AE00000F 000000001000 11223344 0000008000 00");
    const GENAC_TC: &[u8] = &hex!("80AE40000F 000000001000 11223344 0000000000 00");

    #[test]
    fn test_offline_decline() {
        let script: [(&[u8], &[u8]); 1] = [(GENAC_AAC, &hex!("800B 00 0001 1122334455667788 9000"))];
        let mut ctx = denied(&script);
        let (cryptogram, outcome) = analyze(&mut ctx).unwrap();
        assert_eq!(cryptogram, CryptogramType::Aac);
        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(ctx.terminal().value(tags::TSI), Some(&hex!("2000")[..]));
        assert_eq!(ctx.icc().value(tags::ATC), Some(&hex!("0001")[..]));
        assert_eq!(ctx.oda().cdol1_data(), hex!("000000001000 11223344 0000008000"));
    }

    #[test]
    fn test_higher_cryptogram_is_card_error() {
        let script: [(&[u8], &[u8]); 1] = [(GENAC_AAC, &hex!("800B 40 0001 1122334455667788 9000"))];
        let mut ctx = denied(&script);
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Outcome(Outcome::CardError))
        ));
    }

    #[test]
    fn test_approval_paths_unimplemented() {
        // No TVR bit set: the terminal asks for a TC, the card may answer ARQC
        let script: [(&[u8], &[u8]); 1] = [(GENAC_TC, &hex!("800B 80 0001 1122334455667788 9000"))];
        let mut ctx = context(&script, CDOL1);
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Error(Error::Unimplemented(_)))
        ));

        let script: [(&[u8], &[u8]); 1] = [(GENAC_TC, &hex!("800B 00 0001 1122334455667788 9000"))];
        let mut ctx = context(&script, CDOL1);
        assert_eq!(analyze(&mut ctx).unwrap(), (CryptogramType::Aac, Outcome::Declined));
    }

    #[test]
    fn test_response_checks() {
        // No ATC
        let script: [(&[u8], &[u8]); 1] = [(GENAC_AAC, &hex!("770F 9F270100 9F26081122334455667788 9000"))];
        let mut ctx = denied(&script);
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Outcome(Outcome::CardError))
        ));

        let script: [(&[u8], &[u8]); 1] = [(GENAC_AAC, &hex!("6985"))];
        let mut ctx = denied(&script);
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Outcome(Outcome::CardError))
        ));
    }

    #[test]
    fn test_xda_unimplemented() {
        let mut ctx = context(&[], CDOL1);
        ctx.oda.set_method(OdaMethod::Xda);
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Error(Error::Unimplemented(_)))
        ));
    }

    fn cda_response(hash: [u8; 20]) -> Vec<u8> {
        let mut dynamic = hex!("02 A1B2 40 0102030405060708").to_vec();
        dynamic.extend_from_slice(&hash);
        let mut body = hex!("05 01 20").to_vec();
        body.extend_from_slice(&dynamic);
        let sdad = signed_block(&body, 64, &[&hex!("11223344")]);

        let mut response = hex!("774C 9F270140 9F36020001 9F4B40").to_vec();
        response.extend_from_slice(&sdad);
        response.extend_from_slice(&hex!("9000"));
        response
    }

    fn cda_context(script: &[(&[u8], &[u8])]) -> EmvContext<ScriptedCard> {
        let mut ctx = context(script, &hex!("9F3704"));
        ctx.oda.set_method(OdaMethod::Cda);
        ctx.oda
            .set_icc_key(RsaKey::new(&[0xFF; 64], &[0x01]).unwrap());
        ctx
    }

    const GENAC_TC_CDA: &[u8] = &hex!("80AE500004 11223344 00");

    #[test]
    fn test_cda_signature() {
        let hash = cert::sha1(&[&hex!("11223344"), &hex!("9F2701409F36020001")]);
        let response = cda_response(hash);
        let script: [(&[u8], &[u8]); 1] = [(GENAC_TC_CDA, &response)];
        let mut ctx = cda_context(&script);

        // Verified, then stopped at the offline approval
        assert!(matches!(
            analyze(&mut ctx),
            Err(Termination::Error(Error::Unimplemented(_)))
        ));
        assert_eq!(ctx.icc().value(tags::ICC_DYNAMIC_NUMBER), Some(&hex!("A1B2")[..]));
        assert_eq!(
            ctx.icc().value(tags::APPLICATION_CRYPTOGRAM),
            Some(&hex!("0102030405060708")[..])
        );
        assert_eq!(ctx.terminal().value(tags::TVR), Some(&[0u8; 5][..]));
    }

    #[test]
    fn test_cda_failure_declines() {
        let response = cda_response([0x5E; 20]);
        let script: [(&[u8], &[u8]); 1] = [(GENAC_TC_CDA, &response)];
        let mut ctx = cda_context(&script);

        let (cryptogram, outcome) = analyze(&mut ctx).unwrap();
        assert_eq!(cryptogram, CryptogramType::Tc);
        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(ctx.terminal().value(tags::TVR), Some(&hex!("0400000000")[..]));
    }
}
