//! Offline data authentication (EMV Book 3 section 10.3, Book 2)
//!
//! One method is chosen from the AIP and the terminal capabilities. SDA and
//! DDA are completed here. For CDA only the ICC public key is recovered; the
//! signature itself arrives with the first GENERATE AC. XDA is recorded as
//! selected and not verified.

use nexum_emv_tlv::{TlvError, TlvFlags, TlvList, dol, format::EmvDate, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{debug, info, instrument, warn};

use super::{Authenticated, DataRead, Kernel, set_tsi, set_tvr, terminal_data, transaction_date};
use crate::capk::{self, CaPublicKey};
use crate::context::EmvContext;
use crate::error::{Error, Termination};
use crate::fields::{Bit, aip, terminal_capabilities, tsi, tvr};
use crate::oda::cert::{self, KeyData};
use crate::oda::{OdaContext, OdaError, OdaMethod, RsaKey};
use crate::tal::TalFailure;

/// The only data object the Static Data Authentication Tag List may name
const SDA_TAG_LIST_AIP: [u8; 1] = [0x82];

/// Why authentication did not complete
enum AuthFailure {
    /// The card data does not authenticate; the transaction continues
    Card(OdaError),
    /// The card session ends
    Session(Termination),
}

impl From<OdaError> for AuthFailure {
    fn from(error: OdaError) -> Self {
        Self::Card(error)
    }
}

impl From<Termination> for AuthFailure {
    fn from(reason: Termination) -> Self {
        Self::Session(reason)
    }
}

impl From<Error> for AuthFailure {
    fn from(error: Error) -> Self {
        Self::Session(error.into())
    }
}

impl From<TlvError> for AuthFailure {
    fn from(error: TlvError) -> Self {
        Self::Session(error.into())
    }
}

impl<'c, T: CardTransport> Kernel<'c, T, DataRead> {
    /// Select and perform offline data authentication
    ///
    /// Failures of the selected method are recorded in the TVR and do not
    /// stop the transaction. Only errors of the card session, or a missing
    /// or invalid transaction date, end it.
    #[instrument(skip_all)]
    pub fn authenticate(self) -> Result<Kernel<'c, T, Authenticated>, Termination> {
        let ctx = &mut *self.ctx;
        let aid = self.state.application.aid();

        let card = ctx.icc.value(tags::AIP).unwrap_or_default();
        let capabilities: [u8; 3] = terminal_data(&ctx.config, tags::TERMINAL_CAPABILITIES)?;
        let method = select_method(card, &capabilities, ctx.settings.xda_enabled);
        ctx.oda.set_method(method);
        info!(%method, "Offline data authentication method");

        let result = match method {
            OdaMethod::None => {
                set_tvr(&mut ctx.terminal, tvr::ODA_NOT_PERFORMED)?;
                Ok(())
            }
            OdaMethod::Xda => {
                set_tvr(&mut ctx.terminal, tvr::XDA_SELECTED)?;
                Ok(())
            }
            OdaMethod::Sda => {
                set_tvr(&mut ctx.terminal, tvr::SDA_SELECTED)?;
                authenticate_static(ctx, aid)
            }
            OdaMethod::Dda => authenticate_dynamic(ctx, aid),
            OdaMethod::Cda => prepare_combined(ctx, aid),
        };

        match result {
            Ok(()) => debug!(%method, "Offline data authentication passed"),
            Err(AuthFailure::Session(reason)) => return Err(reason),
            Err(AuthFailure::Card(error)) => {
                warn!(%method, %error, "Offline data authentication failed");
                if matches!(error, OdaError::MissingData(_)) {
                    set_tvr(&mut ctx.terminal, tvr::ICC_DATA_MISSING)?;
                }
                if let Some(bit) = failure_bit(method) {
                    set_tvr(&mut ctx.terminal, bit)?;
                }
            }
        }
        if method != OdaMethod::None {
            set_tsi(&mut ctx.terminal, tsi::ODA_PERFORMED)?;
        }

        let application = self.state.application;
        Ok(Kernel::new(self.ctx, Authenticated { application }))
    }
}

/// XDA when enabled, then CDA, DDA and SDA, each only when both the card and
/// the terminal support it
fn select_method(card: &[u8], terminal: &[u8], xda_enabled: bool) -> OdaMethod {
    let mutual = |card_bit: Bit, terminal_bit: Bit| card_bit.is_set(card) && terminal_bit.is_set(terminal);
    if xda_enabled && mutual(aip::XDA, terminal_capabilities::XDA) {
        OdaMethod::Xda
    } else if mutual(aip::CDA, terminal_capabilities::CDA) {
        OdaMethod::Cda
    } else if mutual(aip::DDA, terminal_capabilities::DDA) {
        OdaMethod::Dda
    } else if mutual(aip::SDA, terminal_capabilities::SDA) {
        OdaMethod::Sda
    } else {
        OdaMethod::None
    }
}

const fn failure_bit(method: OdaMethod) -> Option<Bit> {
    match method {
        OdaMethod::Sda => Some(tvr::SDA_FAILED),
        OdaMethod::Dda => Some(tvr::DDA_FAILED),
        OdaMethod::Cda => Some(tvr::CDA_FAILED),
        OdaMethod::None | OdaMethod::Xda => None,
    }
}

fn required<'a>(icc: &'a TlvList, tag: u32, name: &'static str) -> Result<&'a [u8], OdaError> {
    icc.value(tag).ok_or(OdaError::MissingData(name))
}

/// Records flagged by the AFL, followed by the AIP when the Static Data
/// Authentication Tag List asks for it
fn static_data(icc: &TlvList, oda: &OdaContext) -> Result<Vec<u8>, OdaError> {
    if !oda.records_valid() {
        return Err(OdaError::InvalidFormat("record data for authentication"));
    }
    let mut data = oda.records().to_vec();
    if let Some(tag_list) = icc.value(tags::SDA_TAG_LIST) {
        if tag_list != SDA_TAG_LIST_AIP {
            return Err(OdaError::InvalidFormat("static data authentication tag list"));
        }
        data.extend_from_slice(required(icc, tags::AIP, "AIP")?);
    }
    Ok(data)
}

fn issuer_key(
    icc: &TlvList,
    ca_keys: &[CaPublicKey],
    aid: &[u8],
    today: EmvDate,
) -> Result<RsaKey, OdaError> {
    let index = match required(icc, tags::CAPK_INDEX, "CA Public Key Index")? {
        [index] => *index,
        _ => return Err(OdaError::InvalidFormat("CA public key index")),
    };
    let ca_key = capk::find(ca_keys, aid, index).ok_or(OdaError::CaKeyNotFound)?;
    let ca_key = RsaKey::new(ca_key.modulus(), ca_key.exponent())?;
    let data = KeyData {
        certificate: required(icc, tags::ISSUER_PUBLIC_KEY_CERTIFICATE, "Issuer Public Key Certificate")?,
        remainder: icc.value(tags::ISSUER_PUBLIC_KEY_REMAINDER),
        exponent: required(icc, tags::ISSUER_PUBLIC_KEY_EXPONENT, "Issuer Public Key Exponent")?,
    };
    cert::recover_issuer_key(&ca_key, data, required(icc, tags::PAN, "PAN")?, today)
}

fn icc_key<T>(ctx: &EmvContext<T>, aid: &[u8], today: EmvDate) -> Result<RsaKey, OdaError> {
    let icc = &ctx.icc;
    let static_data = static_data(icc, &ctx.oda)?;
    let issuer_key = issuer_key(icc, &ctx.settings.ca_public_keys, aid, today)?;
    let data = KeyData {
        certificate: required(icc, tags::ICC_PUBLIC_KEY_CERTIFICATE, "ICC Public Key Certificate")?,
        remainder: icc.value(tags::ICC_PUBLIC_KEY_REMAINDER),
        exponent: required(icc, tags::ICC_PUBLIC_KEY_EXPONENT, "ICC Public Key Exponent")?,
    };
    cert::recover_icc_key(
        &issuer_key,
        data,
        required(icc, tags::PAN, "PAN")?,
        &static_data,
        today,
    )
}

/// SDA: verify the Signed Static Application Data with the issuer key
fn authenticate_static<T>(ctx: &mut EmvContext<T>, aid: &[u8]) -> Result<(), AuthFailure> {
    let today = transaction_date(&ctx.params)?;
    let static_data = static_data(&ctx.icc, &ctx.oda)?;
    let issuer_key = issuer_key(&ctx.icc, &ctx.settings.ca_public_keys, aid, today)?;
    let ssad = required(
        &ctx.icc,
        tags::SIGNED_STATIC_APPLICATION_DATA,
        "Signed Static Application Data",
    )?;
    let dac = cert::verify_static_data(&issuer_key, ssad, &static_data)?;
    ctx.icc.push(tags::DATA_AUTHENTICATION_CODE, dac, TlvFlags::NONE)?;
    Ok(())
}

/// DDA: INTERNAL AUTHENTICATE with the DDOL data and verify the signature
fn authenticate_dynamic<T: CardTransport>(
    ctx: &mut EmvContext<T>,
    aid: &[u8],
) -> Result<(), AuthFailure> {
    let today = transaction_date(&ctx.params)?;
    let icc_key = icc_key(ctx, aid, today)?;

    let ddol = match ctx.icc.value(tags::DDOL) {
        Some(ddol) => ddol.to_vec(),
        None => ctx
            .config
            .value(tags::proprietary::DEFAULT_DDOL)
            .filter(|ddol| !ddol.is_empty())
            .ok_or(OdaError::MissingData("DDOL"))?
            .to_vec(),
    };
    let has_un = dol::contains(&ddol, tags::UNPREDICTABLE_NUMBER)
        .map_err(|_| OdaError::InvalidFormat("DDOL"))?;
    if !has_un {
        return Err(OdaError::InvalidFormat("DDOL without Unpredictable Number").into());
    }
    let ddol_data = dol::build(&ddol, &[&ctx.params, &ctx.config, &ctx.terminal])
        .map_err(|_| OdaError::InvalidFormat("DDOL related data"))?;

    let mut response = TlvList::new();
    match ctx.tal.internal_authenticate(&ddol_data, &mut response) {
        Ok(()) => {}
        Err(TalFailure::Error(error)) => return Err(Termination::from(error).into()),
        Err(TalFailure::Result(result)) => {
            debug!(%result, "INTERNAL AUTHENTICATE refused");
            return Err(OdaError::InvalidFormat("INTERNAL AUTHENTICATE response").into());
        }
    }
    let sdad = required(
        &response,
        tags::SIGNED_DYNAMIC_APPLICATION_DATA,
        "Signed Dynamic Application Data",
    )?;
    let dynamic_data = cert::verify_dynamic_data(&icc_key, sdad, &ddol_data)?;
    let number = cert::icc_dynamic_number(&dynamic_data)?;
    debug!(icc_dynamic_number = %hex::encode_upper(number), "Dynamic signature verified");

    ctx.icc.push(tags::ICC_DYNAMIC_NUMBER, number, TlvFlags::NONE)?;
    ctx.icc.append(&mut response);
    Ok(())
}

/// CDA: recover the ICC public key for the GENERATE AC signature
fn prepare_combined<T>(ctx: &mut EmvContext<T>, aid: &[u8]) -> Result<(), AuthFailure> {
    let today = transaction_date(&ctx.params)?;
    let icc_key = icc_key(ctx, aid, today)?;
    debug!(len = icc_key.len(), "ICC public key recovered");
    ctx.oda.set_icc_key(icc_key);
    Ok(())
}
